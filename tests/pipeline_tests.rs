// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the frame renderer against an in-memory GPU backend

mod common;

use common::{
    DRAWABLE_TEXTURE_BASE, MockBackend, RecordingListener, frame, listener, sized_frame,
};
use livecam::backends::camera::{FrameData, PixelBuffer, PixelBufferId, PixelFormat, RawFrame};
use livecam::render::{FrameRenderer, RendererSettings};
use std::sync::Arc;
use std::thread;

fn renderer(backend: &MockBackend) -> FrameRenderer<MockBackend> {
    FrameRenderer::new(backend.clone(), RendererSettings::default()).unwrap()
}

fn with_listener(backend: &MockBackend) -> (FrameRenderer<MockBackend>, Arc<RecordingListener>) {
    let renderer = renderer(backend);
    let recorder = Arc::new(RecordingListener::default());
    renderer.set_listener(Some(listener(&recorder)));
    (renderer, recorder)
}

#[test]
fn test_zero_cache_slots_fails_construction() {
    let settings = RendererSettings {
        cache_slots: 0,
        ..Default::default()
    };
    assert!(FrameRenderer::new(MockBackend::deferred(3), settings).is_err());
}

#[test]
fn test_draw_before_render_is_noop() {
    let backend = MockBackend::auto_complete(3);
    let (renderer, recorder) = with_listener(&backend);

    assert!(!renderer.draw());
    assert!(!renderer.draw());
    assert!(backend.submissions().is_empty());
    assert_eq!(recorder.count(), 0);
    assert_eq!(renderer.stats().skipped, 2);
}

#[test]
fn test_render_then_draw_presents_that_frame() {
    let backend = MockBackend::deferred(3);
    let (renderer, recorder) = with_listener(&backend);

    renderer.render(frame(7, 0.25));
    assert!(renderer.draw());

    let submissions = backend.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].source, Some(PixelBufferId(7)));
    assert_eq!(submissions[0].vertex_count, 4);

    // Nothing is reported before the GPU completes the draw
    assert_eq!(recorder.count(), 0);
    assert!(backend.complete_next());

    let frames = recorder.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].source, PixelBufferId(7));
    assert_eq!(frames[0].timestamp, 0.25);
    assert_eq!(frames[0].sequence, 1);
    assert_eq!(frames[0].texture.id, DRAWABLE_TEXTURE_BASE + submissions[0].drawable);
}

#[test]
fn test_latest_frame_wins() {
    let backend = MockBackend::deferred(3);
    let (renderer, recorder) = with_listener(&backend);

    renderer.render(frame(1, 0.0));
    renderer.render(frame(2, 0.033));
    assert_eq!(renderer.current_source(), Some(PixelBufferId(2)));
    assert!(renderer.draw());

    assert_eq!(backend.submissions()[0].source, Some(PixelBufferId(2)));
    backend.complete_all();
    assert_eq!(recorder.sources(), vec![PixelBufferId(2)]);
}

#[test]
fn test_mirror_toggle_is_not_retroactive() {
    let backend = MockBackend::deferred(3);
    let renderer = renderer(&backend);
    assert!(!renderer.is_mirroring_enabled());

    renderer.render(frame(1, 0.0));
    assert!(renderer.draw());
    renderer.set_mirroring_enabled(true);
    assert!(renderer.draw());

    let submissions = backend.submissions();
    assert_eq!(submissions[0].uniforms.is_mirrored, 0);
    assert_eq!(submissions[1].uniforms.is_mirrored, 1);
    assert!(renderer.is_mirroring_enabled());
}

#[test]
fn test_elapsed_time_follows_frame_timestamp() {
    let backend = MockBackend::deferred(3);
    let renderer = renderer(&backend);

    renderer.render(frame(1, 0.5));
    assert_eq!(renderer.uniforms().elapsed_time, 0.5);
    assert!(renderer.draw());
    assert_eq!(backend.submissions()[0].uniforms.elapsed_time, 0.5);
}

#[test]
fn test_notifications_follow_submission_order() {
    let backend = MockBackend::deferred(3);
    let (renderer, recorder) = with_listener(&backend);

    for id in 1..=3 {
        renderer.render(frame(id, id as f64 * 0.033));
        assert!(renderer.draw());
    }
    assert_eq!(renderer.pending_presentations(), 3);

    // The GPU finishes the last draw first
    assert!(backend.complete_last());
    assert_eq!(recorder.count(), 0);

    assert!(backend.complete_next());
    assert_eq!(recorder.sources(), vec![PixelBufferId(1)]);

    backend.complete_all();
    assert_eq!(
        recorder.sources(),
        vec![PixelBufferId(1), PixelBufferId(2), PixelBufferId(3)]
    );
    let sequences: Vec<_> = recorder.frames().iter().map(|f| f.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    assert_eq!(renderer.pending_presentations(), 0);
}

#[test]
fn test_redraws_do_not_repeat_notifications() {
    let backend = MockBackend::auto_complete(3);
    let (renderer, recorder) = with_listener(&backend);

    renderer.render(frame(1, 0.0));
    for _ in 0..4 {
        assert!(renderer.draw());
    }
    // The last completion is released by the next poll
    renderer.draw();

    assert_eq!(backend.submissions().len(), 5);
    assert_eq!(recorder.count(), 1);
    assert_eq!(renderer.stats().presented, 1);
}

#[test]
fn test_draw_skipped_while_drawables_busy() {
    let backend = MockBackend::deferred(1);
    let renderer = renderer(&backend);

    renderer.render(frame(1, 0.0));
    assert!(renderer.draw());
    assert!(!renderer.draw());
    assert_eq!(renderer.stats().skipped, 1);

    backend.complete_all();
    assert!(renderer.draw());
}

#[test]
fn test_failed_submission_is_silent() {
    let backend = MockBackend::deferred(3);
    let (renderer, recorder) = with_listener(&backend);
    backend.set_fail_submissions(true);

    renderer.render(frame(1, 0.0));
    assert!(!renderer.draw());
    assert_eq!(renderer.pending_presentations(), 0);
    assert_eq!(recorder.count(), 0);

    // The frame is still current and still notifies once a draw succeeds
    backend.set_fail_submissions(false);
    assert!(renderer.draw());
    backend.complete_all();
    assert_eq!(recorder.sources(), vec![PixelBufferId(1)]);
}

#[test]
fn test_unconvertible_frames_are_dropped() {
    let backend = MockBackend::deferred(3);
    let renderer = renderer(&backend);

    let nv12 = RawFrame {
        buffer: PixelBuffer::packed(
            PixelBufferId(9),
            4,
            4,
            PixelFormat::Nv12,
            FrameData::from(vec![0u8; 64]),
        ),
        ..frame(9, 0.0)
    };
    renderer.render(nv12);
    assert_eq!(renderer.current_source(), None);

    let short = RawFrame {
        buffer: PixelBuffer::packed(
            PixelBufferId(10),
            4,
            4,
            PixelFormat::Bgra,
            FrameData::from(vec![0u8; 8]),
        ),
        ..frame(10, 0.0)
    };
    renderer.render(short);
    assert_eq!(renderer.current_source(), None);
    assert_eq!(renderer.stats().dropped, 2);
    assert!(!renderer.draw());

    // A good frame afterwards is unaffected
    renderer.render(frame(11, 0.1));
    assert_eq!(renderer.current_source(), Some(PixelBufferId(11)));
}

#[test]
fn test_in_flight_textures_are_never_overwritten() {
    let backend = MockBackend::deferred(3);
    let settings = RendererSettings {
        cache_slots: 2,
        ..Default::default()
    };
    let renderer = FrameRenderer::new(backend.clone(), settings).unwrap();

    renderer.render(frame(1, 0.0));
    assert!(renderer.draw());
    renderer.render(frame(2, 0.033));

    // Slot of frame 1 is held by the pending draw, slot of frame 2 is current
    renderer.render(frame(3, 0.066));
    assert_eq!(renderer.current_source(), Some(PixelBufferId(2)));
    assert_eq!(renderer.stats().dropped, 1);
    assert_eq!(renderer.cache_stats().exhausted, 1);
    assert_eq!(backend.submissions()[0].source, Some(PixelBufferId(1)));

    backend.complete_all();
    renderer.render(frame(3, 0.066));
    assert_eq!(renderer.current_source(), Some(PixelBufferId(3)));
}

#[test]
fn test_recycled_buffers_reuse_textures() {
    let backend = MockBackend::auto_complete(3);
    let renderer = renderer(&backend);

    for index in 0..12u64 {
        renderer.render(frame(index % 4, index as f64 / 30.0));
        renderer.draw();
    }

    let stats = renderer.cache_stats();
    assert!(stats.allocations <= 4, "allocations: {}", stats.allocations);
    assert_eq!(stats.hits + stats.reuses + stats.allocations, 12);
    assert_eq!(stats.exhausted, 0);
}

#[test]
fn test_resolution_change_allocates_new_textures() {
    let backend = MockBackend::auto_complete(3);
    let renderer = renderer(&backend);

    renderer.render(sized_frame(1, 0.0, 4, 4));
    renderer.draw();
    renderer.render(sized_frame(1, 0.1, 8, 2));
    renderer.draw();

    assert_eq!(renderer.cache_stats().allocations, 2);
    assert_eq!(backend.submissions().len(), 2);
}

#[test]
fn test_concurrent_render_and_draw() {
    let backend = MockBackend::auto_complete(3);
    let renderer = Arc::new(renderer(&backend));
    let recorder = Arc::new(RecordingListener::default());
    renderer.set_listener(Some(listener(&recorder)));

    let producer = {
        let renderer = Arc::clone(&renderer);
        thread::spawn(move || {
            for index in 0..300u64 {
                renderer.render(frame(index % 4, index as f64 / 1000.0));
            }
        })
    };
    let consumer = {
        let renderer = Arc::clone(&renderer);
        thread::spawn(move || {
            for _ in 0..300 {
                renderer.draw();
            }
        })
    };
    producer.join().unwrap();
    consumer.join().unwrap();
    renderer.draw();
    renderer.draw();

    let frames = recorder.frames();
    assert!(!frames.is_empty());
    for pair in frames.windows(2) {
        assert!(pair[0].sequence < pair[1].sequence);
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
}
