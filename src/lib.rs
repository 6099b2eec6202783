pub mod diagnostics;
pub mod harness;
mod macros;
#[cfg(feature = "myfilter")]
pub mod myfilter;

use std::error::Error;

use gstreamer::{self, plugin_define};

plugin_define!(
    myfilter,
    "Pass-through filter template",
    plugin_init,
    "0.1.0",
    "LGPL",
    "my-filter-gst-plugin",
    "my-filter-gst-plugin",
    "https://gstreamer.freedesktop.org",
    "2024-06-01"
);

fn plugin_init(plugin: &gstreamer::Plugin) -> Result<(), Box<dyn Error>> {
    #[cfg(feature = "myfilter")]
    myfilter::register(plugin)?;
    Ok(())
}
