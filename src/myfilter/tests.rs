use std::sync::{Arc, Mutex, Once};

use gstreamer::{glib, prelude::*, subclass::prelude::*};

use super::MyFilter;
use crate::diagnostics::MemorySink;

fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        gstreamer::init().unwrap();
        crate::plugin_register_static().unwrap();
    });
}

type FlowResult = Result<gstreamer::FlowSuccess, gstreamer::FlowError>;

/// A `my_filter` instance wired between two test pads, running in PLAYING.
struct Fixture {
    filter: MyFilter,
    upstream: gstreamer::Pad,
    downstream: gstreamer::Pad,
    received: Arc<Mutex<Vec<gstreamer::Buffer>>>,
    events: Arc<Mutex<Vec<gstreamer::EventType>>>,
    flow: Arc<Mutex<FlowResult>>,
    lines: MemorySink,
}

impl Fixture {
    fn new() -> Self {
        init();

        let filter = gstreamer::ElementFactory::make("my_filter")
            .build()
            .unwrap()
            .downcast::<MyFilter>()
            .unwrap();
        let lines = MemorySink::new();
        filter.set_diagnostic_sink(lines.clone());

        let received = Arc::new(Mutex::new(Vec::new()));
        let events = Arc::new(Mutex::new(Vec::new()));
        let flow = Arc::new(Mutex::new(Ok(gstreamer::FlowSuccess::Ok)));

        let upstream = gstreamer::Pad::builder(Some("upstream"), gstreamer::PadDirection::Src).build();
        let downstream = {
            let received = received.clone();
            let events = events.clone();
            let flow = flow.clone();
            gstreamer::Pad::builder(Some("downstream"), gstreamer::PadDirection::Sink)
                .chain_function(move |_pad, _parent, buffer| {
                    received.lock().unwrap().push(buffer);
                    *flow.lock().unwrap()
                })
                .event_function(move |_pad, _parent, event| {
                    events.lock().unwrap().push(event.type_());
                    true
                })
                .build()
        };

        upstream
            .link(&filter.static_pad("sink").unwrap())
            .unwrap();
        filter
            .static_pad("src")
            .unwrap()
            .link(&downstream)
            .unwrap();

        upstream.set_active(true).unwrap();
        downstream.set_active(true).unwrap();
        filter.set_state(gstreamer::State::Playing).unwrap();

        Self {
            filter,
            upstream,
            downstream,
            received,
            events,
            flow,
            lines,
        }
    }

    fn start_stream(&self, caps: &gstreamer::Caps) {
        assert!(self
            .upstream
            .push_event(gstreamer::event::StreamStart::new("my-filter-test")));
        assert!(self.upstream.push_event(gstreamer::event::Caps::new(caps)));
        let segment = gstreamer::FormattedSegment::<gstreamer::ClockTime>::new();
        assert!(self
            .upstream
            .push_event(gstreamer::event::Segment::new(&segment)));
    }

    fn push_bytes(&self, size: usize) -> FlowResult {
        self.upstream.push(gstreamer::Buffer::with_size(size).unwrap())
    }

    fn set_downstream_flow(&self, flow: FlowResult) {
        *self.flow.lock().unwrap() = flow;
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = self.filter.set_state(gstreamer::State::Null);
        let _ = self.upstream.set_active(false);
        let _ = self.downstream.set_active(false);
    }
}

fn raw_video_caps() -> gstreamer::Caps {
    gstreamer::Caps::builder("video/x-raw")
        .field("format", "I420")
        .field("width", 640i32)
        .field("height", 480i32)
        .field("framerate", gstreamer::Fraction::new(30, 1))
        .build()
}

#[test]
fn factory_creates_filter_with_two_always_pads() {
    init();

    let element = gstreamer::ElementFactory::make("my_filter")
        .name("my_filter")
        .build()
        .unwrap();
    assert!(element.is::<MyFilter>());

    let sink = element.static_pad("sink").unwrap();
    let src = element.static_pad("src").unwrap();
    assert_eq!(sink.direction(), gstreamer::PadDirection::Sink);
    assert_eq!(src.direction(), gstreamer::PadDirection::Src);
    assert_eq!(element.pads().len(), 2);

    for pad in [&sink, &src] {
        assert!(pad.pad_template_caps().is_any());
        assert!(pad.pad_flags().contains(gstreamer::PadFlags::PROXY_CAPS));
    }
}

#[test]
fn silent_defaults_to_false_and_round_trips() {
    init();

    let filter = gstreamer::ElementFactory::make("my_filter").build().unwrap();
    assert!(!filter.property::<bool>("silent"));

    for value in [true, false, true] {
        filter.set_property("silent", value);
        assert_eq!(filter.property::<bool>("silent"), value);
    }
}

#[test]
fn unknown_property_is_not_exposed() {
    init();

    let filter = gstreamer::ElementFactory::make("my_filter").build().unwrap();
    assert!(filter.find_property("verbose").is_none());
    assert!(filter.find_property("silent").is_some());
    assert!(!filter.property::<bool>("silent"));
}

#[test]
fn rejected_values_leave_silent_unchanged() {
    init();

    let filter = gstreamer::ElementFactory::make("my_filter")
        .build()
        .unwrap()
        .downcast::<MyFilter>()
        .unwrap();
    let imp = filter.imp();
    let silent = filter.find_property("silent").unwrap();
    let verbose = glib::ParamSpecBoolean::builder("verbose").build();

    // GLib checks these before the element, so call the implementation directly
    ObjectImpl::set_property(imp, 0, &"yes".to_value(), &silent);
    assert!(!filter.property::<bool>("silent"));

    ObjectImpl::set_property(imp, 0, &true.to_value(), &verbose);
    assert!(!filter.property::<bool>("silent"));

    let value = ObjectImpl::property(imp, 0, &verbose);
    assert!(!value.get::<bool>().unwrap());
}

#[test]
fn silent_is_writable_while_playing() {
    let fixture = Fixture::new();
    fixture.filter.set_property("silent", true);
    assert!(fixture.filter.property::<bool>("silent"));
    fixture.filter.set_property("silent", false);
    assert!(!fixture.filter.property::<bool>("silent"));
}

#[test]
fn buffers_are_forwarded_unchanged() {
    let fixture = Fixture::new();
    fixture.start_stream(&raw_video_caps());

    let mut buffer = gstreamer::Buffer::from_slice(vec![1u8, 2, 3, 4, 5]);
    {
        let buffer = buffer.get_mut().unwrap();
        buffer.set_pts(gstreamer::ClockTime::from_mseconds(40));
        buffer.set_offset(7);
    }
    assert_eq!(fixture.upstream.push(buffer), Ok(gstreamer::FlowSuccess::Ok));

    let received = fixture.received.lock().unwrap();
    assert_eq!(received.len(), 1);
    let out = &received[0];
    assert_eq!(out.pts(), Some(gstreamer::ClockTime::from_mseconds(40)));
    assert_eq!(out.offset(), 7);
    assert_eq!(&*out.map_readable().unwrap(), &[1u8, 2, 3, 4, 5][..]);
}

#[test]
fn reports_one_line_per_buffer_unless_silent() {
    let fixture = Fixture::new();
    fixture.start_stream(&raw_video_caps());

    assert!(fixture.push_bytes(42).is_ok());
    assert!(fixture.push_bytes(1024).is_ok());
    assert_eq!(
        fixture.lines.lines(),
        vec![
            "Have data of size 42 bytes!".to_owned(),
            "Have data of size 1024 bytes!".to_owned(),
        ]
    );

    fixture.lines.clear();
    fixture.filter.set_property("silent", true);
    for _ in 0..3 {
        assert!(fixture.push_bytes(42).is_ok());
    }
    assert!(fixture.lines.lines().is_empty());
    assert_eq!(fixture.received.lock().unwrap().len(), 5);
}

#[test]
fn downstream_flow_returns_are_passed_through() {
    let fixture = Fixture::new();
    fixture.start_stream(&raw_video_caps());

    for flow in [
        Err(gstreamer::FlowError::Flushing),
        Err(gstreamer::FlowError::Eos),
        Err(gstreamer::FlowError::NotNegotiated),
        Err(gstreamer::FlowError::Error),
        Ok(gstreamer::FlowSuccess::CustomSuccess),
        Ok(gstreamer::FlowSuccess::Ok),
    ] {
        fixture.set_downstream_flow(flow);
        assert_eq!(fixture.push_bytes(8), flow);
    }
    assert_eq!(fixture.received.lock().unwrap().len(), 6);
    assert_eq!(fixture.lines.lines().len(), 6);
}

#[test]
fn unlinked_src_reports_not_linked() {
    let fixture = Fixture::new();
    fixture.start_stream(&raw_video_caps());

    let src = fixture.filter.static_pad("src").unwrap();
    src.unlink(&fixture.downstream).unwrap();

    assert_eq!(
        fixture.push_bytes(16),
        Err(gstreamer::FlowError::NotLinked)
    );
    assert!(fixture.received.lock().unwrap().is_empty());
}

#[test]
fn caps_event_then_buffer_never_fails_negotiation() {
    let fixture = Fixture::new();
    fixture.start_stream(&raw_video_caps());
    assert!(fixture.push_bytes(4).is_ok());

    let audio = gstreamer::Caps::builder("audio/x-raw")
        .field("format", "S16LE")
        .field("rate", 48_000i32)
        .field("channels", 2i32)
        .build();
    assert!(fixture.upstream.push_event(gstreamer::event::Caps::new(&audio)));
    assert!(fixture.push_bytes(4).is_ok());

    assert_eq!(
        fixture.filter.static_pad("src").unwrap().current_caps(),
        Some(audio)
    );
}

#[test]
fn events_are_forwarded_downstream() {
    let fixture = Fixture::new();
    fixture.start_stream(&raw_video_caps());
    assert!(fixture.push_bytes(4).is_ok());
    assert!(fixture.upstream.push_event(gstreamer::event::Eos::new()));

    let events = fixture.events.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            gstreamer::EventType::StreamStart,
            gstreamer::EventType::Caps,
            gstreamer::EventType::Segment,
            gstreamer::EventType::Eos,
        ]
    );
}

#[test]
fn position_query_without_upstream_answer_fails_cleanly() {
    let fixture = Fixture::new();
    let src = fixture.filter.static_pad("src").unwrap();

    let mut query = gstreamer::query::Position::new(gstreamer::Format::Time);
    assert!(!src.query(&mut query));

    let mut query = gstreamer::query::Duration::new(gstreamer::Format::Time);
    assert!(!src.query(&mut query));
}

#[test]
fn position_and_duration_come_from_upstream() {
    init();

    let filter = gstreamer::ElementFactory::make("my_filter").build().unwrap();
    let upstream = gstreamer::Pad::builder(Some("upstream"), gstreamer::PadDirection::Src)
        .query_function(|_pad, _parent, query| match query.view_mut() {
            gstreamer::QueryViewMut::Position(position) => {
                position.set(Some(gstreamer::ClockTime::from_seconds(5)));
                true
            }
            gstreamer::QueryViewMut::Duration(duration) => {
                duration.set(Some(gstreamer::ClockTime::from_seconds(60)));
                true
            }
            _ => false,
        })
        .build();
    upstream
        .link(&filter.static_pad("sink").unwrap())
        .unwrap();
    let src = filter.static_pad("src").unwrap();

    let mut query = gstreamer::query::Position::new(gstreamer::Format::Time);
    assert!(src.query(&mut query));
    assert_eq!(
        query.result(),
        gstreamer::GenericFormattedValue::Time(Some(gstreamer::ClockTime::from_seconds(5)))
    );

    let mut query = gstreamer::query::Duration::new(gstreamer::Format::Time);
    assert!(src.query(&mut query));
    assert_eq!(
        query.result(),
        gstreamer::GenericFormattedValue::Time(Some(gstreamer::ClockTime::from_seconds(60)))
    );
}

#[test]
fn caps_query_is_any_until_negotiated() {
    let fixture = Fixture::new();
    let src = fixture.filter.static_pad("src").unwrap();

    let mut query = gstreamer::query::Caps::new(None);
    assert!(src.query(&mut query));
    assert!(query.result().unwrap().is_any());

    let caps = raw_video_caps();
    let mut query = gstreamer::query::Caps::new(Some(&caps));
    assert!(src.query(&mut query));
    assert_eq!(query.result().unwrap().to_owned(), caps);
}

#[test]
fn caps_query_reports_negotiated_format() {
    let fixture = Fixture::new();
    let caps = raw_video_caps();
    fixture.start_stream(&caps);

    let src = fixture.filter.static_pad("src").unwrap();
    let mut query = gstreamer::query::Caps::new(None);
    assert!(src.query(&mut query));
    assert_eq!(query.result().unwrap().to_owned(), caps);

    let other = gstreamer::Caps::builder("audio/x-raw").build();
    let mut query = gstreamer::query::Caps::new(Some(&other));
    assert!(src.query(&mut query));
    assert!(query.result().unwrap().is_empty());
}

#[test]
fn pipeline_reaches_end_of_stream() {
    init();

    let pipeline = gstreamer::parse_launch(
        "fakesrc num-buffers=5 sizetype=fixed sizemax=64 ! my_filter silent=true ! fakesink",
    )
    .unwrap()
    .downcast::<gstreamer::Pipeline>()
    .unwrap();
    let bus = pipeline.bus().unwrap();

    pipeline.set_state(gstreamer::State::Playing).unwrap();
    let msg = bus
        .timed_pop_filtered(
            gstreamer::ClockTime::from_seconds(10),
            &[gstreamer::MessageType::Eos, gstreamer::MessageType::Error],
        )
        .unwrap();
    pipeline.set_state(gstreamer::State::Null).unwrap();

    assert_eq!(msg.type_(), gstreamer::MessageType::Eos);
}
