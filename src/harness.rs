//! Playback harness that drives `filesrc ! demuxer ! parser ! decoder !
//! converter ! my_filter ! sink` until end-of-stream or the first error.

use std::{
    fmt,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use crossbeam::channel::{self, Receiver, Sender};
use gstreamer::{glib, prelude::*};
use once_cell::sync::Lazy;
use thiserror::Error;

static CAT: Lazy<gstreamer::DebugCategory> = Lazy::new(|| {
    gstreamer::DebugCategory::new(
        "myfilter-harness",
        gstreamer::DebugColorFlags::empty(),
        Some("Pass-through filter playback harness"),
    )
});

/// Exit status for a wrong argument count.
pub const USAGE_EXIT_CODE: i32 = 1;
/// Exit status for every other failure.
pub const FAILURE_EXIT_CODE: i32 = -1;

/// The node a factory name stands for in the fixed topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRole {
    Source,
    Demuxer,
    Parser,
    Decoder,
    Converter,
    Filter,
    Sink,
}

impl ElementRole {
    fn instance_name(self) -> &'static str {
        match self {
            ElementRole::Source => "my_filesource",
            ElementRole::Demuxer => "my_demuxer",
            ElementRole::Parser => "my_parser",
            ElementRole::Decoder => "my_decoder",
            ElementRole::Converter => "my_videoconvert",
            ElementRole::Filter => "my_filter",
            ElementRole::Sink => "videosink",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub location: PathBuf,
    pub source: String,
    pub demuxer: String,
    pub parser: String,
    pub decoder: String,
    pub converter: String,
    pub filter: String,
    pub sink: String,
    /// How often the playback position is printed. `None` disables polling.
    pub position_interval: Option<Duration>,
}

impl HarnessConfig {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            source: "filesrc".to_owned(),
            demuxer: "qtdemux".to_owned(),
            parser: "h264parse".to_owned(),
            decoder: "avdec_h264".to_owned(),
            converter: "videoconvert".to_owned(),
            filter: "my_filter".to_owned(),
            sink: "autovideosink".to_owned(),
            position_interval: Some(Duration::from_secs(1)),
        }
    }

    /// Expects the program name followed by exactly one media file path.
    pub fn from_args<I>(args: I) -> Result<Self, HarnessError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let program = args.next().unwrap_or_else(|| "my-filter-demo".to_owned());
        match (args.next(), args.next()) {
            (Some(location), None) => Ok(Self::new(location)),
            _ => Err(HarnessError::Usage { program }),
        }
    }

    fn factory(&self, role: ElementRole) -> &str {
        match role {
            ElementRole::Source => &self.source,
            ElementRole::Demuxer => &self.demuxer,
            ElementRole::Parser => &self.parser,
            ElementRole::Decoder => &self.decoder,
            ElementRole::Converter => &self.converter,
            ElementRole::Filter => &self.filter,
            ElementRole::Sink => &self.sink,
        }
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Usage: {program} <media file>")]
    Usage { program: String },
    #[error("{}", missing_element_message(*role, factory))]
    MissingElement { role: ElementRole, factory: String },
    #[error("{from} and {to} could not be linked.")]
    Link { from: String, to: String },
    #[error("Failed to start up pipeline!")]
    StateChange { detail: Option<String> },
    #[error("Error: {message}")]
    Stream {
        message: String,
        debug: Option<String>,
    },
    #[error("Main loop stopped before end-of-stream")]
    Interrupted,
    #[error("Pipeline has no bus")]
    NoBus,
    #[error(transparent)]
    Glib(#[from] glib::BoolError),
}

fn missing_element_message(role: ElementRole, factory: &str) -> String {
    match role {
        ElementRole::Decoder | ElementRole::Sink => {
            "Decoder or output could not be found - check your install".to_owned()
        }
        ElementRole::Converter => format!(
            "Could not create {} element, check your installation",
            factory
        ),
        ElementRole::Filter => format!(
            "Your self-written filter could not be found. Make sure it is installed correctly in \
             $(libdir)/gstreamer-1.0/ or ~/.gstreamer-1.0/plugins/ and that gst-inspect-1.0 lists \
             it ({}). If it doesn't, check with 'GST_DEBUG=*:2 gst-inspect-1.0' for the reason why \
             it is not being loaded.",
            factory
        ),
        ElementRole::Source | ElementRole::Demuxer | ElementRole::Parser => {
            format!("Could not create {} element", factory)
        }
    }
}

impl HarnessError {
    pub fn exit_code(&self) -> i32 {
        match self {
            HarnessError::Usage { .. } => USAGE_EXIT_CODE,
            _ => FAILURE_EXIT_CODE,
        }
    }

    /// Prints the error the way a user of the command line expects it.
    pub fn report(&self) {
        match self {
            HarnessError::Usage { .. } | HarnessError::MissingElement { .. } => {
                println!("{}", self)
            }
            HarnessError::StateChange { detail } => {
                eprintln!("{}", self);
                if let Some(detail) = detail {
                    println!("ERROR: {}", detail);
                }
            }
            HarnessError::Stream { debug, .. } => {
                println!("{}", self);
                if let Some(debug) = debug {
                    println!("Debug details: {}", debug);
                }
            }
            HarnessError::Link { .. }
            | HarnessError::Interrupted
            | HarnessError::NoBus
            | HarnessError::Glib(_) => eprintln!("{}", self),
        }
    }
}

/// A demuxer pad that appeared while the pipeline was running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPad {
    pub name: String,
    pub linked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    EndOfStream,
    Error {
        message: String,
        debug: Option<String>,
    },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::EndOfStream => f.write_str("End-of-stream"),
            Outcome::Error { message, .. } => write!(f, "Error: {}", message),
        }
    }
}

/// Result of a completed run.
#[derive(Debug)]
pub struct Report {
    pub outcome: Outcome,
    pub discovered_pads: Vec<DiscoveredPad>,
}

pub struct Harness {
    pipeline: gstreamer::Pipeline,
    filter: gstreamer::Element,
    position_interval: Option<Duration>,
    discovered: Receiver<DiscoveredPad>,
}

impl Harness {
    /// Creates, adds and links every node. Nothing is started yet.
    pub fn build(config: &HarnessConfig) -> Result<Self, HarnessError> {
        let pipeline = gstreamer::Pipeline::new(Some("my_pipeline"));

        let make = |role: ElementRole| {
            gstreamer::ElementFactory::make(config.factory(role))
                .name(role.instance_name())
                .build()
                .ok()
        };
        let source = make(ElementRole::Source);
        let demuxer = make(ElementRole::Demuxer);
        let parser = make(ElementRole::Parser);
        let decoder = make(ElementRole::Decoder);
        let converter = make(ElementRole::Converter);
        let filter = make(ElementRole::Filter);
        let sink = make(ElementRole::Sink);

        let require = |role: ElementRole, element: Option<gstreamer::Element>| {
            element.ok_or_else(|| HarnessError::MissingElement {
                role,
                factory: config.factory(role).to_owned(),
            })
        };
        let sink = require(ElementRole::Sink, sink)?;
        let decoder = require(ElementRole::Decoder, decoder)?;
        let converter = require(ElementRole::Converter, converter)?;
        let filter = require(ElementRole::Filter, filter)?;
        let source = require(ElementRole::Source, source)?;
        let demuxer = require(ElementRole::Demuxer, demuxer)?;
        let parser = require(ElementRole::Parser, parser)?;

        source.set_property("location", &*config.location.to_string_lossy());

        pipeline.add_many(&[
            &source, &demuxer, &parser, &decoder, &converter, &filter, &sink,
        ])?;

        link(&source, &demuxer)?;
        let discovered = link_dynamic(&demuxer, &parser);
        for pair in [&parser, &decoder, &converter, &filter, &sink].windows(2) {
            link(pair[0], pair[1])?;
        }

        gstreamer::info!(
            CAT,
            obj: &pipeline,
            "Built pipeline for {}",
            config.location.display()
        );

        Ok(Self {
            pipeline,
            filter,
            position_interval: config.position_interval,
            discovered,
        })
    }

    pub fn pipeline(&self) -> &gstreamer::Pipeline {
        &self.pipeline
    }

    /// Asks the filter's sink pad whether it would take a fixed raw video
    /// format, printing the query and its answer.
    pub fn probe_accept_caps(&self) -> bool {
        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "I420")
            .field("width", 640i32)
            .field("height", 480i32)
            .field("framerate", gstreamer::Fraction::new(30, 1))
            .build();
        let Some(sinkpad) = self.filter.static_pad("sink") else {
            gstreamer::warning!(CAT, obj: &self.filter, "Filter has no sink pad");
            return false;
        };

        let mut query = gstreamer::query::AcceptCaps::new(&caps);
        println!("Query type: {:?}", query.type_());
        println!("Caps: {}", caps);
        let accepted = sinkpad.query(&mut query) && query.result();
        gstreamer::debug!(CAT, obj: &sinkpad, "accept-caps answered {}", accepted);
        accepted
    }

    /// Plays the pipeline and blocks until end-of-stream or an error.
    pub fn run(self) -> Result<Report, HarnessError> {
        let main_loop = glib::MainLoop::new(None, false);
        let outcome = Arc::new(Mutex::new(None));
        let bus = self.pipeline.bus().ok_or(HarnessError::NoBus)?;

        let watch = {
            let main_loop = main_loop.clone();
            let outcome = outcome.clone();
            bus.add_watch(move |_bus, msg| {
                if let Some(result) = outcome_of(msg) {
                    gstreamer::debug!(CAT, "Stopping on {}", result);
                    outcome.lock().unwrap().get_or_insert(result);
                    main_loop.quit();
                }
                glib::Continue(true)
            })?
        };

        if let Err(err) = self.pipeline.set_state(gstreamer::State::Playing) {
            gstreamer::error!(CAT, obj: &self.pipeline, "Cannot play: {:?}", err);
            let detail = bus
                .pop_filtered(&[gstreamer::MessageType::Error])
                .and_then(|msg| match msg.view() {
                    gstreamer::MessageView::Error(err) => Some(err.error().to_string()),
                    _ => None,
                });
            watch.remove();
            let _ = self.pipeline.set_state(gstreamer::State::Null);
            return Err(HarnessError::StateChange { detail });
        }

        let poll = self.position_interval.map(|interval| {
            let pipeline = self.pipeline.downgrade();
            glib::timeout_add(interval, move || {
                let Some(pipeline) = pipeline.upgrade() else {
                    return glib::Continue(false);
                };
                match pipeline.query_position::<gstreamer::ClockTime>() {
                    Some(position) => println!("Current position: {}", position),
                    None => println!("Failed to query current position"),
                }
                glib::Continue(true)
            })
        });

        main_loop.run();

        if let Some(poll) = poll {
            poll.remove();
        }
        watch.remove();
        if let Err(err) = self.pipeline.set_state(gstreamer::State::Null) {
            gstreamer::warning!(CAT, obj: &self.pipeline, "Cannot shut down: {:?}", err);
        }

        let discovered_pads: Vec<_> = self.discovered.try_iter().collect();
        for pad in &discovered_pads {
            gstreamer::info!(CAT, "Demuxer pad {} linked: {}", pad.name, pad.linked);
        }

        let outcome = outcome.lock().unwrap().take();
        conclude(outcome, discovered_pads)
    }
}

fn conclude(
    outcome: Option<Outcome>,
    discovered_pads: Vec<DiscoveredPad>,
) -> Result<Report, HarnessError> {
    match outcome {
        Some(Outcome::EndOfStream) => Ok(Report {
            outcome: Outcome::EndOfStream,
            discovered_pads,
        }),
        Some(Outcome::Error { message, debug }) => Err(HarnessError::Stream { message, debug }),
        None => Err(HarnessError::Interrupted),
    }
}

fn outcome_of(msg: &gstreamer::Message) -> Option<Outcome> {
    match msg.view() {
        gstreamer::MessageView::Eos(..) => Some(Outcome::EndOfStream),
        gstreamer::MessageView::Error(err) => Some(Outcome::Error {
            message: err.error().to_string(),
            debug: err.debug().map(|debug| debug.to_string()),
        }),
        _ => None,
    }
}

fn link(from: &gstreamer::Element, to: &gstreamer::Element) -> Result<(), HarnessError> {
    from.link(to).map_err(|_| HarnessError::Link {
        from: from.name().to_string(),
        to: to.name().to_string(),
    })
}

/// Links the demuxer's pads to the parser as they appear. A static src pad is
/// linked right away; every pad added later is reported on the returned
/// channel once.
fn link_dynamic(
    demuxer: &gstreamer::Element,
    parser: &gstreamer::Element,
) -> Receiver<DiscoveredPad> {
    let (sender, receiver) = channel::unbounded();

    if let Some(src) = demuxer.static_pad("src") {
        link_pad(&src, demuxer, parser, &sender);
    }

    let parser = parser.clone();
    demuxer.connect_pad_added(move |demuxer, src| {
        link_pad(src, demuxer, &parser, &sender);
    });

    receiver
}

fn link_pad(
    src: &gstreamer::Pad,
    demuxer: &gstreamer::Element,
    parser: &gstreamer::Element,
    sender: &Sender<DiscoveredPad>,
) {
    let Some(sinkpad) = parser.static_pad("sink") else {
        gstreamer::warning!(CAT, obj: parser, "Parser has no sink pad");
        return;
    };

    let linked = if sinkpad.is_linked() {
        gstreamer::debug!(CAT, obj: src, "Parser already linked, ignoring pad");
        false
    } else {
        match src.link(&sinkpad) {
            Ok(_) => true,
            Err(err) => {
                eprintln!(
                    "Failed to link {} to {}.",
                    demuxer.name(),
                    parser.name()
                );
                gstreamer::warning!(CAT, obj: src, "Link failed: {:?}", err);
                false
            }
        }
    };

    // the receiver is gone once the run has finished
    let _ = sender.send(DiscoveredPad {
        name: src.name().to_string(),
        linked,
    });
}
