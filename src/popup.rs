//! The popup shown for a selected feature.

use egui::{Color32, Rect, Ui};

use crate::codec::format_lat_lon;
use crate::events::FeatureKind;
use crate::projection::{GeoPos, MapProjection};
use crate::store::{Marker, Zone};

/// What a popup shows.
#[derive(Clone, Debug, PartialEq)]
pub enum PopupContent {
    /// Details of a marker.
    Marker {
        /// Title line.
        title: String,
        /// Marker position.
        coords: GeoPos,
        /// Marker grid reference.
        grid_ref: String,
    },
    /// Details of a risk zone.
    Zone {
        /// Zone name.
        name: String,
        /// Risk score between 0 and 100.
        risk_score: u8,
        /// Why the zone is risky.
        reason: Option<String>,
        /// Who is responsible for the zone.
        owner: Option<String>,
    },
}

impl PopupContent {
    /// The text lines of the popup, title first.
    pub fn lines(&self) -> Vec<String> {
        match self {
            Self::Marker {
                title,
                coords,
                grid_ref,
            } => vec![title.clone(), format_lat_lon(*coords), grid_ref.clone()],
            Self::Zone {
                name,
                risk_score,
                reason,
                owner,
            } => {
                let mut lines = vec![name.clone(), format!("Risk: {risk_score}/100")];
                if let Some(reason) = reason {
                    lines.push(format!("Reason: {reason}"));
                }
                if let Some(owner) = owner {
                    lines.push(format!("Owner: {owner}"));
                }
                lines
            }
        }
    }
}

impl From<&Marker> for PopupContent {
    fn from(marker: &Marker) -> Self {
        Self::Marker {
            title: marker.title(),
            coords: marker.pos(),
            grid_ref: marker.grid_ref.clone(),
        }
    }
}

impl From<&Zone> for PopupContent {
    fn from(zone: &Zone) -> Self {
        Self::Zone {
            name: zone.name.clone(),
            risk_score: zone.risk_score,
            reason: zone.reason.clone(),
            owner: zone.owner.clone(),
        }
    }
}

/// An open popup.
#[derive(Clone, Debug, PartialEq)]
pub struct Popup {
    /// Where the popup points to.
    pub anchor: GeoPos,
    /// Kind of the selected feature.
    pub feature_kind: FeatureKind,
    /// Id of the selected feature.
    pub feature_id: String,
    /// What the popup shows.
    pub content: PopupContent,
}

/// Holds at most one popup and draws it over the map.
#[derive(Clone, Debug, Default)]
pub struct PopupOverlay {
    current: Option<Popup>,
}

impl PopupOverlay {
    /// Opens `popup`, replacing any open one.
    pub fn show(&mut self, popup: Popup) {
        self.current = Some(popup);
    }

    /// Closes the popup. Returns whether one was open.
    pub fn hide(&mut self) -> bool {
        self.current.take().is_some()
    }

    /// The open popup.
    pub fn current(&self) -> Option<&Popup> {
        self.current.as_ref()
    }

    /// Closes the popup if it belongs to the given feature.
    pub fn hide_for(&mut self, kind: FeatureKind, id: &str) -> bool {
        if self
            .current
            .as_ref()
            .is_some_and(|popup| popup.feature_kind == kind && popup.feature_id == id)
        {
            self.current = None;
            true
        } else {
            false
        }
    }

    /// Draws the popup next to its anchor. Anchors outside `clip` are not drawn.
    pub fn show_ui(&mut self, ui: &Ui, projection: &MapProjection, clip: Rect) {
        let Some(popup) = &self.current else {
            return;
        };
        let anchor = projection.project(popup.anchor);
        if !clip.contains(anchor) {
            return;
        }

        let bg_color = if ui.visuals().dark_mode {
            Color32::from_black_alpha(220)
        } else {
            Color32::from_white_alpha(235)
        };
        let frame = egui::Frame::NONE
            .inner_margin(egui::Margin::same(6))
            .fill(bg_color)
            .stroke(egui::Stroke::new(1.0, Color32::GRAY))
            .corner_radius(4.0);

        let mut close = false;
        egui::Area::new(ui.id().with("feature_popup"))
            .fixed_pos(anchor)
            .pivot(egui::Align2::CENTER_BOTTOM)
            .show(ui.ctx(), |ui| {
                frame.show(ui, |ui| {
                    let lines = popup.content.lines();
                    ui.horizontal(|ui| {
                        if let Some(title) = lines.first() {
                            ui.strong(title);
                        }
                        close = ui.small_button("✕").clicked();
                    });
                    for line in lines.iter().skip(1) {
                        ui.label(line);
                    }
                });
            });

        if close {
            self.current = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MarkerId, ZoneId};
    use chrono::Utc;

    #[test]
    fn marker_popup_lines() {
        let marker = Marker {
            id: MarkerId::new("m1"),
            lat: 33.75,
            lon: -84.39,
            grid_ref: "16SGC4176337497".to_string(),
            created_at: Utc::now(),
        };
        let lines = PopupContent::from(&marker).lines();
        assert_eq!(
            lines,
            vec!["Marker m1", "33.75000°N, 84.39000°W", "16SGC4176337497"]
        );
    }

    #[test]
    fn zone_popup_lines() {
        let zone = Zone {
            id: ZoneId::new("zone-1"),
            name: "Flood plain".to_string(),
            ring: Vec::new(),
            risk_score: 82,
            reason: Some("Seasonal flooding".to_string()),
            owner: None,
        };
        let lines = PopupContent::from(&zone).lines();
        assert_eq!(
            lines,
            vec!["Flood plain", "Risk: 82/100", "Reason: Seasonal flooding"]
        );
    }

    #[test]
    fn hide_for_only_matching_feature() {
        let mut overlay = PopupOverlay::default();
        assert!(!overlay.hide());

        overlay.show(Popup {
            anchor: GeoPos::default(),
            feature_kind: FeatureKind::Marker,
            feature_id: "m1".to_string(),
            content: PopupContent::Zone {
                name: String::new(),
                risk_score: 0,
                reason: None,
                owner: None,
            },
        });
        assert!(!overlay.hide_for(FeatureKind::Marker, "m2"));
        assert!(!overlay.hide_for(FeatureKind::Zone, "m1"));
        assert!(overlay.current().is_some());
        assert!(overlay.hide_for(FeatureKind::Marker, "m1"));
        assert!(overlay.current().is_none());
    }
}
