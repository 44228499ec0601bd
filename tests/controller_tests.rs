// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the view controller over synthetic capture and a mock GPU

mod common;

use common::{MockBackend, RecordingListener, frame, listener};
use livecam::app::{CameraViewController, ControllerSettings, HeadlessView, HostView};
use livecam::backends::camera::synthetic::{FrameInjector, SyntheticDiscovery, SyntheticGraph};
use livecam::backends::camera::{
    AuthorizationStatus, CameraPosition, CameraSession, CaptureConfiguration, PixelBufferId,
};
use livecam::constants::SessionPreset;
use livecam::render::{ClearColor, SurfaceLayer};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn settings(position: CameraPosition) -> ControllerSettings {
    ControllerSettings {
        position,
        layer: SurfaceLayer::new((4, 8), ClearColor::BLACK, 60),
        ..Default::default()
    }
}

fn controller(
    discovery: SyntheticDiscovery,
    position: CameraPosition,
) -> (CameraViewController<MockBackend>, FrameInjector, MockBackend) {
    let (graph, injector) = SyntheticGraph::manual();
    let backend = MockBackend::auto_complete(3);
    let controller = CameraViewController::new(
        Arc::new(discovery),
        Box::new(graph),
        backend.clone(),
        settings(position),
    )
    .unwrap();
    (controller, injector, backend)
}

/// Draw until `done` holds or a second passes
fn draw_until(controller: &CameraViewController<MockBackend>, done: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(1);
    while Instant::now() < deadline {
        controller.renderer().draw();
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    done()
}

#[test]
fn test_load_view_inserts_surface_at_bottom() {
    let (controller, _injector, _backend) = controller(SyntheticDiscovery::new(), CameraPosition::Front);
    let view = HeadlessView::new((320, 640));
    view.insert_layer(SurfaceLayer::new((1, 1), ClearColor::BLACK, 30), 0);

    controller.load_view(&view);

    let layers = view.layers();
    assert_eq!(layers.len(), 2);
    assert_eq!(layers[0], *controller.layer());
    assert_eq!(layers[0].drawable_size, (4, 8));
}

#[test]
fn test_mirroring_defaults_on_and_toggles() {
    let (controller, _injector, _backend) = controller(SyntheticDiscovery::new(), CameraPosition::Front);
    assert!(controller.is_mirroring_enabled());
    controller.set_mirroring_enabled(false);
    assert!(!controller.is_mirroring_enabled());
}

#[test]
fn test_back_camera_three_frame_scenario() {
    let (controller, injector, _backend) = controller(SyntheticDiscovery::new(), CameraPosition::Back);
    let recorder = Arc::new(RecordingListener::default());
    controller.set_listener(Some(listener(&recorder)));

    controller.load_view(&HeadlessView::new((4, 8)));
    controller.view_did_load().unwrap();
    controller.session().flush();
    assert_eq!(controller.session().current_position(), CameraPosition::Back);
    assert!(controller.session().is_running());

    for (id, timestamp) in [(1u64, 0.0), (2, 0.033), (3, 0.066)] {
        assert!(injector.inject(frame(id, timestamp)));
        controller.session().flush();
        controller.renderer().draw();
    }

    assert!(draw_until(&controller, || recorder.count() == 3));
    let frames = recorder.frames();
    assert_eq!(
        recorder.sources(),
        vec![PixelBufferId(1), PixelBufferId(2), PixelBufferId(3)]
    );
    for pair in frames.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
    assert_eq!(controller.presented_frames(), 3);
    assert_eq!(controller.session().delivered_frames(), 3);
}

#[test]
fn test_access_requested_when_not_determined() {
    let discovery = SyntheticDiscovery::new().with_authorization(AuthorizationStatus::NotDetermined);
    let (controller, _injector, _backend) = controller(discovery, CameraPosition::Front);

    controller.view_did_load().unwrap();
    controller.session().flush();

    assert_eq!(controller.session().current_position(), CameraPosition::Front);
    assert_eq!(
        controller.session().discovery().authorization_status(),
        AuthorizationStatus::Authorized
    );
}

#[test]
fn test_denied_access_leaves_camera_off() {
    let discovery = SyntheticDiscovery::new().with_authorization(AuthorizationStatus::Denied);
    let (controller, injector, _backend) = controller(discovery, CameraPosition::Front);

    controller.view_did_load().unwrap();
    controller.session().flush();

    assert_eq!(
        controller.session().current_position(),
        CameraPosition::Unspecified
    );
    assert!(!controller.session().is_running());
    assert!(!injector.inject(frame(1, 0.0)));
    assert!(controller.is_displaying());
}

#[test]
fn test_change_camera_toggles_position() {
    let (controller, injector, _backend) = controller(SyntheticDiscovery::new(), CameraPosition::Front);
    controller.view_did_load().unwrap();
    controller.session().flush();

    controller.change_camera();
    controller.session().flush();
    assert_eq!(controller.session().current_position(), CameraPosition::Back);

    // Frames keep flowing after the switch
    assert!(injector.inject(frame(5, 1.0)));
    controller.session().flush();
    assert_eq!(controller.renderer().current_source(), Some(PixelBufferId(5)));

    controller.change_camera();
    controller.session().flush();
    assert_eq!(controller.session().current_position(), CameraPosition::Front);
}

#[test]
fn test_missing_camera_keeps_running_input() {
    let discovery = SyntheticDiscovery::with_positions(&[CameraPosition::Front]);
    let (controller, _injector, _backend) = controller(discovery, CameraPosition::Front);
    controller.view_did_load().unwrap();
    controller.session().flush();

    controller.change_camera();
    controller.session().flush();
    assert_eq!(controller.session().current_position(), CameraPosition::Front);
    assert!(controller.session().is_running());
}

#[test]
fn test_drop_stops_capture_and_display() {
    let (controller, injector, _backend) = controller(SyntheticDiscovery::new(), CameraPosition::Front);
    controller.view_did_load().unwrap();
    controller.session().flush();
    assert!(controller.is_displaying());
    assert!(injector.inject(frame(1, 0.0)));

    drop(controller);
    assert!(!injector.inject(frame(2, 0.1)));
}

#[test]
fn test_concurrent_configure_leaves_one_input() {
    let (graph, _injector) = SyntheticGraph::manual();
    let session = CameraSession::new(
        Arc::new(SyntheticDiscovery::new()),
        Box::new(graph),
        CaptureConfiguration {
            preset: SessionPreset::Vga640x480,
            ..Default::default()
        },
    )
    .unwrap();

    let workers: Vec<_> = [CameraPosition::Front, CameraPosition::Back]
        .into_iter()
        .map(|position| {
            let session = session.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    session.configure(position);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let committed = session.committed_configuration();
    let input = committed.input.expect("one input");
    assert!(matches!(
        input.device.position,
        CameraPosition::Front | CameraPosition::Back
    ));
    assert_eq!(session.current_position(), input.device.position);
    assert!(session.is_running());
}
