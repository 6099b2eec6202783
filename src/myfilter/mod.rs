use std::error::Error;

use gstreamer::{glib, prelude::StaticType, subclass::prelude::*};

use crate::diagnostics::DiagnosticSink;

mod imp;

#[cfg(test)]
mod tests;

glib::wrapper! {
    pub struct MyFilter(ObjectSubclass<imp::MyFilter>) @extends gstreamer::Element, gstreamer::Object;
}

impl MyFilter {
    /// Routes the per-buffer size lines of this instance to `sink`.
    pub fn set_diagnostic_sink(&self, sink: impl DiagnosticSink + 'static) {
        self.imp().set_diagnostic_sink(Box::new(sink));
    }
}

pub fn register(plugin: &gstreamer::Plugin) -> Result<(), impl Error> {
    gstreamer::Element::register(
        Some(plugin),
        "my_filter",
        gstreamer::Rank::None,
        MyFilter::static_type(),
    )
}
