// SPDX-License-Identifier: GPL-3.0-only

//! Camera discovery through the GStreamer device monitor

use super::ensure_initialized;
use crate::backends::camera::{
    AuthorizationStatus, CameraDevice, CameraPosition, DeviceDiscovery, DeviceHandle, DeviceType,
    MediaType, VideoOrientation,
};
use gstreamer::prelude::*;
use tracing::{debug, info, warn};

/// Device class reported by camera device providers
const VIDEO_SOURCE_CLASS: &str = "Video/Source";

/// Properties carrying the mounting location, in lookup order
const LOCATION_KEYS: [&str; 2] = ["api.libcamera.location", "camera.location"];

/// Properties carrying the sensor rotation, in lookup order
const ROTATION_KEYS: [&str; 2] = ["api.libcamera.rotation", "camera.rotation"];

/// Properties that identify a device across enumerations, in lookup order
const ID_KEYS: [&str; 4] = ["object.serial", "node.name", "api.v4l2.path", "device.path"];

/// Enumerates `Video/Source` devices
///
/// Linux has no camera permission prompt: access is granted once GStreamer
/// can initialize, and a device the user cannot open fails when its input is
/// created instead.
#[derive(Debug, Default)]
pub struct GstDeviceDiscovery;

impl GstDeviceDiscovery {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceDiscovery for GstDeviceDiscovery {
    fn authorization_status(&self) -> AuthorizationStatus {
        match ensure_initialized() {
            Ok(()) => AuthorizationStatus::Authorized,
            Err(e) => {
                warn!(error = %e, "Camera access restricted");
                AuthorizationStatus::Restricted
            }
        }
    }

    fn request_access(&self, completion: Box<dyn FnOnce(bool) + Send>) {
        completion(self.authorization_status() == AuthorizationStatus::Authorized);
    }

    fn devices(&self) -> Vec<CameraDevice> {
        if let Err(e) = ensure_initialized() {
            warn!(error = %e, "Cannot enumerate cameras");
            return Vec::new();
        }

        let monitor = gstreamer::DeviceMonitor::new();
        let _filter = monitor.add_filter(Some(VIDEO_SOURCE_CLASS), None);
        if let Err(e) = monitor.start() {
            warn!(error = %e, "Device monitor failed to start");
            return Vec::new();
        }

        let devices: Vec<CameraDevice> = monitor
            .devices()
            .into_iter()
            .enumerate()
            .map(|(index, device)| describe_device(index, device))
            .collect();
        monitor.stop();

        info!(count = devices.len(), "Enumerated cameras");
        for device in &devices {
            debug!(
                id = %device.unique_id,
                name = %device.name,
                position = %device.position,
                orientation = %device.orientation,
                "Camera"
            );
        }
        devices
    }

    /// Exact position match first; cameras without a reported location stand
    /// in for the front camera
    fn default_device(
        &self,
        device_type: DeviceType,
        media_type: MediaType,
        position: CameraPosition,
    ) -> Option<CameraDevice> {
        if media_type != MediaType::Video {
            return None;
        }
        let devices = self.devices();
        let exact = devices
            .iter()
            .find(|device| device.device_type == device_type && device.position == position);
        if let Some(device) = exact {
            return Some(device.clone());
        }
        if position == CameraPosition::Front {
            return devices
                .into_iter()
                .find(|device| device.position == CameraPosition::Unspecified);
        }
        None
    }
}

fn describe_device(index: usize, device: gstreamer::Device) -> CameraDevice {
    let name = device.display_name().to_string();
    let properties = device.properties();

    let lookup = |keys: &[&str]| -> Option<String> {
        let properties = properties.as_ref()?;
        keys.iter().find_map(|key| property_string(properties, key))
    };

    let position = lookup(&LOCATION_KEYS)
        .map(|location| CameraPosition::from_location(&location))
        .unwrap_or(CameraPosition::Unspecified);
    let orientation = lookup(&ROTATION_KEYS)
        .and_then(|rotation| rotation.trim().parse::<i32>().ok())
        .map(VideoOrientation::from_sensor_rotation)
        .unwrap_or_default();
    let unique_id = lookup(&ID_KEYS).unwrap_or_else(|| format!("{}#{}", name, index));

    CameraDevice {
        unique_id,
        name,
        position,
        device_type: DeviceType::BuiltInWideAngleCamera,
        orientation,
        handle: DeviceHandle::GStreamer(device),
    }
}

/// Read a property as a string whatever its stored type
fn property_string(properties: &gstreamer::StructureRef, key: &str) -> Option<String> {
    let value = properties.value(key).ok()?;
    if let Ok(text) = value.get::<String>() {
        return Some(text);
    }
    if let Ok(number) = value.get::<i32>() {
        return Some(number.to_string());
    }
    value.serialize().ok().map(|text| text.to_string())
}
