// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use livecam::constants::{SessionPreset, render};

#[test]
fn test_session_preset_values() {
    assert_eq!(SessionPreset::ALL.len(), 4);
}

#[test]
fn test_session_preset_ordering() {
    // Presets are ordered from smallest to largest frame
    let mut prev_pixels = 0u32;
    for preset in SessionPreset::ALL {
        let (width, height) = preset.dimensions();
        assert!(
            width * height > prev_pixels,
            "Presets should be ordered from smallest to largest"
        );
        prev_pixels = width * height;
    }
}

#[test]
fn test_session_preset_display_names() {
    let names: Vec<_> = SessionPreset::ALL.iter().map(|p| p.display_name()).collect();
    assert_eq!(names, ["VGA", "720p", "1080p", "4K"]);
}

#[test]
fn test_default_drawable_is_portrait() {
    assert!(render::DRAWABLE_HEIGHT > render::DRAWABLE_WIDTH);
    assert!(render::DRAWABLE_COUNT >= 2);
    assert!(render::TEXTURE_CACHE_SLOTS > render::DRAWABLE_COUNT);
}
