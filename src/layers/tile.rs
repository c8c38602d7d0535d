//! A layer for tile maps on the map.
//!
//! Tiles are downloaded on background threads and kept in memory for the lifetime of
//! the layer.

use egui::{Color32, Painter, Pos2, Rect, Vec2, pos2};
use eyre::Context;
use log::{debug, error};
use once_cell::sync::Lazy;
use poll_promise::Promise;
use std::{collections::HashMap, rc::Rc, sync::Arc};

use crate::config::MapConfig;
use crate::layers::Layer;
use crate::projection::{MapProjection, TILE_SIZE, lat_to_y, lon_to_x};
use crate::{MAX_ZOOM, MapError, TileId};

// Reuse the reqwest client for all tile downloads by making it a static variable.
static CLIENT: Lazy<Option<reqwest::blocking::Client>> = Lazy::new(|| {
    reqwest::blocking::Client::builder()
        .user_agent(format!(
            "{}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ))
        .build()
        .map_err(|e| error!("Failed to build tile client: {e}"))
        .ok()
});

/// The state of a tile in the cache.
enum Tile {
    /// The tile is being downloaded.
    Loading(Promise<Result<egui::ColorImage, Arc<eyre::Report>>>),

    /// The tile is in memory.
    Loaded(egui::TextureHandle),

    /// The tile failed to download.
    Failed(Arc<eyre::Report>),
}

/// A layer that manages and renders map tiles on the map view.
pub struct TileLayer {
    tiles: HashMap<TileId, Tile>,
    visible_tiles: Vec<(TileId, Rect)>,
    /// Color tint applied to the tile images when rendering
    pub tint: Color32,
    config: Rc<dyn MapConfig>,
}

impl TileLayer {
    /// Creates a new tile layer with the given map configuration.
    pub fn new(config: Rc<dyn MapConfig>) -> Self {
        Self {
            tiles: Default::default(),
            visible_tiles: Default::default(),
            tint: Color32::WHITE,
            config,
        }
    }
}

impl Layer for TileLayer {
    fn prepare(&mut self, ctx: &egui::Context, projection: &MapProjection) {
        self.visible_tiles = visible_tiles(projection);
        for (tile_id, _) in &self.visible_tiles {
            load_tile(&mut self.tiles, self.config.as_ref(), ctx, *tile_id);
        }
    }

    fn draw(&self, painter: &Painter, _: &MapProjection) {
        for (tile_id, tile_rect) in &self.visible_tiles {
            draw_tile(&self.tiles, painter, tile_id, *tile_rect, self.tint);
        }
    }
}

/// Returns the tiles covering the projection's viewport with their screen rectangles.
///
/// Tiles are fetched at the integer zoom below the camera zoom and scaled up.
pub(crate) fn visible_tiles(projection: &MapProjection) -> Vec<(TileId, Rect)> {
    let zoom = projection.zoom();
    let tile_zoom = zoom.floor().clamp(0.0, f64::from(MAX_ZOOM));
    let tile_px = TILE_SIZE * 2.0_f64.powf(zoom - tile_zoom);
    let z = tile_zoom as u8;
    let tiles_per_side = 1_i64 << z;

    let center = projection.center();
    let center_x = lon_to_x(center.lon, tile_zoom);
    let center_y = lat_to_y(center.lat, tile_zoom);

    let rect = projection.widget_rect();
    let half_w = rect.width() as f64 / 2.0 / tile_px;
    let half_h = rect.height() as f64 / 2.0 / tile_px;

    let x_min = ((center_x - half_w).floor() as i64).max(0);
    let y_min = ((center_y - half_h).floor() as i64).max(0);
    let x_max = ((center_x + half_w).ceil() as i64).min(tiles_per_side - 1);
    let y_max = ((center_y + half_h).ceil() as i64).min(tiles_per_side - 1);

    let widget_center = rect.center();
    let mut tiles = Vec::new();
    for x in x_min..=x_max {
        for y in y_min..=y_max {
            let min = widget_center
                + Vec2::new(
                    ((x as f64 - center_x) * tile_px) as f32,
                    ((y as f64 - center_y) * tile_px) as f32,
                );
            let tile_rect = Rect::from_min_size(min, Vec2::splat(tile_px as f32));
            tiles.push((
                TileId {
                    z,
                    x: x as u32,
                    y: y as u32,
                },
                tile_rect,
            ));
        }
    }
    tiles
}

fn load_tile(
    tiles: &mut HashMap<TileId, Tile>,
    config: &dyn MapConfig,
    ctx: &egui::Context,
    tile_id: TileId,
) {
    let tile_state = tiles.entry(tile_id).or_insert_with(|| {
        let url = config.tile_url(&tile_id);
        let promise =
            Promise::spawn_thread("download_tile", move || -> Result<_, Arc<eyre::Report>> {
                download_tile(&url)
                    .with_context(|| format!("Failed to download tile from {}", &url))
                    .map_err(Arc::new)
            });
        Tile::Loading(promise)
    });

    // If the tile is loading, check if the promise is ready and update the state.
    if let Tile::Loading(promise) = tile_state {
        if let Some(result) = promise.ready() {
            match result {
                Ok(color_image) => {
                    let texture = ctx.load_texture(
                        format!("tile_{}_{}_{}", tile_id.z, tile_id.x, tile_id.y),
                        color_image.clone(),
                        Default::default(),
                    );
                    *tile_state = Tile::Loaded(texture);
                }
                Err(e) => {
                    error!("{:?}", e);
                    *tile_state = Tile::Failed(e.clone());
                }
            }
        } else {
            // The tile is still loading, so we need to tell egui to repaint.
            ctx.request_repaint();
        }
    }
}

fn download_tile(url: &str) -> Result<egui::ColorImage, MapError> {
    debug!("Downloading tile from {}", url);
    let client = CLIENT
        .as_ref()
        .ok_or_else(|| MapError::TileDownloadError("no HTTP client".to_string()))?;
    let response = client.get(url).send()?;

    if !response.status().is_success() {
        return Err(MapError::TileDownloadError(response.status().to_string()));
    }

    let bytes = response.bytes()?.to_vec();
    let image = image::load_from_memory(&bytes)?.to_rgba8();

    let size = [image.width() as _, image.height() as _];
    let pixels = image.into_raw();
    Ok(egui::ColorImage::from_rgba_unmultiplied(size, &pixels))
}

fn draw_tile(
    tiles: &HashMap<TileId, Tile>,
    painter: &Painter,
    tile_id: &TileId,
    tile_rect: Rect,
    tint: Color32,
) {
    match tiles.get(tile_id) {
        Some(Tile::Loaded(texture)) => {
            painter.image(
                texture.id(),
                tile_rect,
                Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
                tint,
            );
        }
        Some(Tile::Failed(e)) => {
            draw_placeholder(painter, tile_rect, "!", Color32::RED);
            painter.text(
                tile_rect.center_bottom() - Vec2::new(0.0, 8.0),
                egui::Align2::CENTER_BOTTOM,
                failure_caption(e),
                egui::FontId::proportional(10.0),
                Color32::DARK_RED,
            );
        }
        Some(Tile::Loading(_)) | None => {
            draw_placeholder(painter, tile_rect, "?", Color32::ORANGE)
        }
    }
}

/// A short reason for a failed tile, taken from the innermost error.
fn failure_caption(report: &eyre::Report) -> String {
    const MAX_CHARS: usize = 32;
    let reason = report.root_cause().to_string();
    if reason.chars().count() > MAX_CHARS {
        let mut caption: String = reason.chars().take(MAX_CHARS - 1).collect();
        caption.push('…');
        caption
    } else {
        reason
    }
}

/// Draws a gray tile with a border and a symbol in the center.
fn draw_placeholder(painter: &Painter, tile_rect: Rect, symbol: &str, color: Color32) {
    painter.rect_filled(tile_rect, 0.0, Color32::from_gray(220));
    painter.rect_stroke(
        tile_rect,
        0.0,
        egui::Stroke::new(1.0, Color32::GRAY),
        egui::StrokeKind::Inside,
    );
    let center: Pos2 = tile_rect.center();
    painter.text(
        center,
        egui::Align2::CENTER_CENTER,
        symbol,
        egui::FontId::proportional(40.0),
        color,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::GeoPos;
    use egui::vec2;

    fn projection(zoom: f64, center: GeoPos) -> MapProjection {
        MapProjection::new(
            zoom,
            center,
            Rect::from_min_size(pos2(0.0, 0.0), vec2(512.0, 512.0)),
        )
    }

    #[test]
    fn whole_world_at_zoom_zero() {
        let tiles = visible_tiles(&projection(0.0, GeoPos::default()));
        assert_eq!(tiles.len(), 1);
        let (tile_id, rect) = tiles[0];
        assert_eq!(tile_id, TileId { z: 0, x: 0, y: 0 });
        assert_eq!(rect.width(), 256.0);
        assert_eq!(rect.center(), pos2(256.0, 256.0));
    }

    #[test]
    fn tiles_stay_inside_the_world() {
        for (tile_id, _) in visible_tiles(&projection(3.0, GeoPos::from_lat_lon(85.0, -180.0))) {
            assert!(tile_id.x < 8 && tile_id.y < 8, "{tile_id:?}");
        }
    }

    #[test]
    fn fractional_zoom_scales_tiles() {
        let tiles = visible_tiles(&projection(4.5, GeoPos::from_lat_lon(33.75, -84.39)));
        assert!(!tiles.is_empty());
        for (tile_id, rect) in &tiles {
            assert_eq!(tile_id.z, 4);
            assert!((rect.width() - 256.0 * 2.0_f32.sqrt()).abs() < 1e-3);
        }
    }

    #[test]
    fn failure_caption_shows_root_cause() {
        let report = eyre::Report::new(MapError::TileDownloadError("404 Not Found".to_string()))
            .wrap_err("Failed to download tile from http://tiles.invalid/1/0/0.png");
        assert_eq!(
            failure_caption(&report),
            "A map tile failed to download. …"
        );

        let short = eyre::eyre!("timed out");
        assert_eq!(failure_caption(&short), "timed out");
    }

    #[test]
    fn viewport_is_covered() {
        let projection = projection(10.0, GeoPos::from_lat_lon(60.17, 24.94));
        let tiles = visible_tiles(&projection);
        for corner in [pos2(0.0, 0.0), pos2(511.0, 0.0), pos2(0.0, 511.0), pos2(511.0, 511.0)] {
            assert!(
                tiles.iter().any(|(_, rect)| rect.contains(corner)),
                "{corner:?} is not covered"
            );
        }
    }
}
