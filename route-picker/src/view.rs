use serde::{Deserialize, Serialize};

use crate::config::PickerConfig;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub longitude: f64,
    pub latitude: f64,
    pub zoom: f64,
    pub pitch: f64,
    pub bearing: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            longitude: -0.127,
            latitude: 51.507,
            zoom: 14.0,
            pitch: 0.0,
            bearing: 0.0,
        }
    }
}

/// A device position, as reported by the browser's geolocation API
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeolocationError {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
}

/// Ask the camera to move smoothly to `target`
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CameraTransition {
    pub target: ViewState,
    pub animated: bool,
    pub duration_ms: u64,
}

pub struct ViewController {
    view: ViewState,
    fly_to_zoom: f64,
    fly_to_duration_ms: u64,
}

impl ViewController {
    pub fn new(config: &PickerConfig) -> Self {
        Self {
            view: config.initial_view,
            fly_to_zoom: config.fly_to_zoom,
            fly_to_duration_ms: config.fly_to_duration_ms,
        }
    }

    pub fn view(&self) -> ViewState {
        self.view
    }

    /// Called once at startup with the device position. If there's no usable fix, the map just
    /// stays where it started.
    pub fn on_position(
        &mut self,
        position: Result<Position, GeolocationError>,
    ) -> Option<CameraTransition> {
        let position = match position {
            Ok(position) => position,
            Err(err) => {
                log::info!("No device position ({:?}), keeping the default view", err);
                return None;
            }
        };
        if !(-90.0..=90.0).contains(&position.latitude)
            || !(-180.0..=180.0).contains(&position.longitude)
        {
            log::info!("Ignoring out-of-range device position {:?}", position);
            return None;
        }

        self.view = ViewState {
            longitude: position.longitude,
            latitude: position.latitude,
            zoom: self.fly_to_zoom,
            ..self.view
        };
        Some(CameraTransition {
            target: self.view,
            animated: true,
            duration_ms: self.fly_to_duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fly_to_device_position() {
        let mut view = ViewController::new(&PickerConfig::default());
        let transition = view
            .on_position(Ok(Position {
                latitude: 48.8566,
                longitude: 2.3522,
            }))
            .unwrap();
        assert!(transition.animated);
        assert_eq!(transition.target.longitude, 2.3522);
        assert_eq!(transition.target.latitude, 48.8566);
        assert_eq!(transition.target.zoom, 13.0);
        assert_eq!(view.view(), transition.target);
    }

    #[test]
    fn test_geolocation_denied() {
        let mut view = ViewController::new(&PickerConfig::default());
        assert_eq!(view.on_position(Err(GeolocationError::PermissionDenied)), None);
        assert_eq!(
            view.view(),
            ViewState {
                longitude: -0.127,
                latitude: 51.507,
                zoom: 14.0,
                pitch: 0.0,
                bearing: 0.0,
            }
        );

        // NaN fails the range check too
        assert_eq!(
            view.on_position(Ok(Position {
                latitude: f64::NAN,
                longitude: 0.0,
            })),
            None
        );
        assert_eq!(view.view(), ViewState::default());
    }
}
