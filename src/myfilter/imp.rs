use std::{str::FromStr, sync::RwLock};

use gstreamer::{glib, prelude::*, subclass::prelude::*};
use once_cell::sync::Lazy;
use strum::IntoEnumIterator;
use strum_macros::{EnumIter, EnumString, IntoStaticStr};

use crate::{
    diagnostics::{DiagnosticSink, StdoutSink},
    macros::set_field,
};

static CAT: Lazy<gstreamer::DebugCategory> = Lazy::new(|| {
    gstreamer::DebugCategory::new(
        "myfilter",
        gstreamer::DebugColorFlags::empty(),
        Some("Pass-through filter"),
    )
});

#[derive(Clone, Copy, Debug, PartialEq, EnumString, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
enum SettingField {
    Silent,
}

#[derive(Debug, Clone, Default)]
struct Settings {
    silent: bool,
}

pub struct MyFilter {
    settings: RwLock<Settings>,
    diagnostics: RwLock<Box<dyn DiagnosticSink>>,
    sinkpad: gstreamer::Pad,
    srcpad: gstreamer::Pad,
}

impl MyFilter {
    pub(super) fn set_diagnostic_sink(&self, sink: Box<dyn DiagnosticSink>) {
        gstreamer::debug!(CAT, imp: self, "Replacing diagnostic sink");
        *self.diagnostics.write().unwrap() = sink;
    }

    fn sink_chain(
        &self,
        pad: &gstreamer::Pad,
        buffer: gstreamer::Buffer,
    ) -> Result<gstreamer::FlowSuccess, gstreamer::FlowError> {
        gstreamer::log!(CAT, obj: pad, "Handling buffer {:?}", buffer);

        let silent = self.settings.read().unwrap().silent;
        if !silent {
            self.diagnostics
                .read()
                .unwrap()
                .report(&format!("Have data of size {} bytes!", buffer.size()));
        }

        // downstream flow returns travel back upstream untouched
        self.srcpad.push(buffer)
    }

    fn sink_event(&self, pad: &gstreamer::Pad, event: gstreamer::Event) -> bool {
        gstreamer::log!(
            CAT,
            obj: pad,
            "Received {:?} event: {:?}",
            event.type_(),
            event
        );

        if let gstreamer::EventView::Caps(caps) = event.view() {
            gstreamer::debug!(CAT, obj: pad, "Upstream format is now {}", caps.caps());
        }

        gstreamer::Pad::event_default(pad, Some(&*self.obj()), event)
    }

    fn src_query(&self, pad: &gstreamer::Pad, query: &mut gstreamer::QueryRef) -> bool {
        gstreamer::log!(CAT, obj: pad, "Handling query {:?}", query);

        match query.view_mut() {
            gstreamer::QueryViewMut::Position(position) => {
                match self.sinkpad.peer_query_position_generic(position.format()) {
                    Some(value) => {
                        gstreamer::trace!(CAT, obj: pad, "Upstream position {}", value);
                        position.set(value);
                        true
                    }
                    None => {
                        gstreamer::debug!(CAT, obj: pad, "Upstream has no position yet");
                        false
                    }
                }
            }
            gstreamer::QueryViewMut::Duration(duration) => {
                match self.sinkpad.peer_query_duration_generic(duration.format()) {
                    Some(value) => {
                        gstreamer::trace!(CAT, obj: pad, "Upstream duration {}", value);
                        duration.set(value);
                        true
                    }
                    None => {
                        gstreamer::debug!(CAT, obj: pad, "Upstream has no duration");
                        false
                    }
                }
            }
            gstreamer::QueryViewMut::Caps(caps_query) => {
                // ANY until negotiation is done
                let current = pad
                    .current_caps()
                    .unwrap_or_else(|| pad.pad_template_caps());
                let result = match caps_query.filter() {
                    Some(filter) => {
                        filter.intersect_with_mode(&current, gstreamer::CapsIntersectMode::First)
                    }
                    None => current,
                };
                gstreamer::debug!(CAT, obj: pad, "Answering caps query with {}", result);
                caps_query.set_result(Some(&result));
                true
            }
            _ => gstreamer::Pad::query_default(pad, Some(&*self.obj()), query),
        }
    }
}

#[glib::object_subclass]
impl ObjectSubclass for MyFilter {
    const NAME: &'static str = "GstMyFilter";
    type Type = super::MyFilter;
    type ParentType = gstreamer::Element;

    fn with_class(klass: &Self::Class) -> Self {
        let templ = klass.pad_template("sink").unwrap();
        let sinkpad = gstreamer::Pad::builder_with_template(&templ, Some("sink"))
            .chain_function(|pad, parent, buffer| {
                MyFilter::catch_panic_pad_function(
                    parent,
                    || Err(gstreamer::FlowError::Error),
                    |filter| filter.sink_chain(pad, buffer),
                )
            })
            .event_function(|pad, parent, event| {
                MyFilter::catch_panic_pad_function(
                    parent,
                    || false,
                    |filter| filter.sink_event(pad, event),
                )
            })
            .flags(gstreamer::PadFlags::PROXY_CAPS)
            .build();

        let templ = klass.pad_template("src").unwrap();
        let srcpad = gstreamer::Pad::builder_with_template(&templ, Some("src"))
            .query_function(|pad, parent, query| {
                MyFilter::catch_panic_pad_function(
                    parent,
                    || false,
                    |filter| filter.src_query(pad, query),
                )
            })
            .flags(gstreamer::PadFlags::PROXY_CAPS)
            .build();

        Self {
            settings: RwLock::new(Settings::default()),
            diagnostics: RwLock::new(Box::new(StdoutSink)),
            sinkpad,
            srcpad,
        }
    }
}

impl ObjectImpl for MyFilter {
    fn properties() -> &'static [glib::ParamSpec] {
        static PROPERTIES: Lazy<Vec<glib::ParamSpec>> = Lazy::new(|| {
            SettingField::iter()
                .map(|setting| match setting {
                    SettingField::Silent => glib::ParamSpecBoolean::builder(setting.into())
                        .nick("Silent")
                        .blurb("Produce verbose output?")
                        .default_value(Settings::default().silent)
                        .build(),
                })
                .collect()
        });
        PROPERTIES.as_ref()
    }

    fn constructed(&self) {
        self.parent_constructed();

        let obj = self.obj();
        obj.add_pad(&self.sinkpad).unwrap();
        obj.add_pad(&self.srcpad).unwrap();
    }

    // GLib validates names and value types first; the fallbacks below only
    // guard direct calls.
    fn set_property(&self, _id: usize, value: &glib::Value, pspec: &glib::ParamSpec) {
        match SettingField::from_str(pspec.name()) {
            Ok(field) => {
                let mut settings = self.settings.write().unwrap();
                match field {
                    SettingField::Silent => {
                        set_field!(CAT, self, field, settings.silent, value);
                    }
                }
            }
            Err(_err) => {
                gstreamer::warning!(
                    CAT,
                    imp: self,
                    "Invalid property {}, leaving settings unchanged",
                    pspec.name()
                );
            }
        }
    }

    fn property(&self, _id: usize, pspec: &glib::ParamSpec) -> glib::Value {
        match SettingField::from_str(pspec.name()) {
            Ok(field) => {
                let settings = self.settings.read().unwrap();
                match field {
                    SettingField::Silent => settings.silent.to_value(),
                }
            }
            Err(_err) => {
                gstreamer::warning!(CAT, imp: self, "Invalid property {}", pspec.name());
                pspec.default_value().clone()
            }
        }
    }
}

impl GstObjectImpl for MyFilter {}

impl ElementImpl for MyFilter {
    fn metadata() -> Option<&'static gstreamer::subclass::ElementMetadata> {
        static ELEMENT_METADATA: Lazy<gstreamer::subclass::ElementMetadata> = Lazy::new(|| {
            gstreamer::subclass::ElementMetadata::new(
                "MyFilter",
                "Filter/Generic",
                "Passes buffers through unchanged, optionally printing their size",
                "ytkj <user@hostname.org>",
            )
        });

        Some(&*ELEMENT_METADATA)
    }

    fn pad_templates() -> &'static [gstreamer::PadTemplate] {
        static PAD_TEMPLATES: Lazy<Vec<gstreamer::PadTemplate>> = Lazy::new(|| {
            [
                ("src", gstreamer::PadDirection::Src),
                ("sink", gstreamer::PadDirection::Sink),
            ]
            .into_iter()
            .map(|(name, direction)| {
                gstreamer::PadTemplate::new(
                    name,
                    direction,
                    gstreamer::PadPresence::Always,
                    &gstreamer::Caps::new_any(),
                )
                .unwrap()
            })
            .collect()
        });
        PAD_TEMPLATES.as_ref()
    }

    fn change_state(
        &self,
        transition: gstreamer::StateChange,
    ) -> Result<gstreamer::StateChangeSuccess, gstreamer::StateChangeError> {
        gstreamer::trace!(CAT, imp: self, "Changing state {:?}", transition);
        self.parent_change_state(transition)
    }
}
