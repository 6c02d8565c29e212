//! Room extraction: cut named polygon regions out of promoted floor plans.
//!
//! A room is defined by a polygon in unit-fraction coordinates over one
//! promoted asset. Extraction rasterises a filled mask at full resolution,
//! applies it as the alpha channel of an RGBA copy, then crops to the
//! polygon's clamped bounding box — so a room PNG is transparent outside
//! its walls. Room ids are stable: re-extracting a room with the same name
//! on the same asset reuses the existing id and overwrites its image.
//!
//! Room entries live nested inside the owning [`SavedAsset`] in both the
//! project document record and the disk mirror.

use crate::error::PlanliftError;
use crate::manifest::Room;
use crate::pipeline::extract::PixelBox;
use crate::registry::RegistryService;
use crate::storage::Storage;
use chrono::Utc;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One requested room: a name and a polygon in unit fractions (0–1).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RoomSpec {
    pub name: String,
    /// Vertices as `[x, y]` pairs, each in 0–1 of the parent image.
    pub points: Vec<[f32; 2]>,
}

/// Clamped axis-aligned bounding box of a polygon, in pixels.
///
/// A full-bounds polygon maps to `(0, 0, width, height)` exactly.
pub fn polygon_aabb(points: &[[f32; 2]], img_width: u32, img_height: u32) -> PixelBox {
    let w = img_width as f32;
    let h = img_height as f32;
    let mut x0 = f32::MAX;
    let mut y0 = f32::MAX;
    let mut x1 = f32::MIN;
    let mut y1 = f32::MIN;
    for p in points {
        x0 = x0.min(p[0] * w);
        y0 = y0.min(p[1] * h);
        x1 = x1.max(p[0] * w);
        y1 = y1.max(p[1] * h);
    }
    let x = (x0.floor().max(0.0) as u32).min(img_width.saturating_sub(1));
    let y = (y0.floor().max(0.0) as u32).min(img_height.saturating_sub(1));
    let width = ((x1.ceil().min(w) as u32).saturating_sub(x)).clamp(1, img_width - x);
    let height = ((y1.ceil().min(h) as u32).saturating_sub(y)).clamp(1, img_height - y);
    PixelBox {
        x,
        y,
        width,
        height,
    }
}

fn polygon_pixels(points: &[[f32; 2]], img_width: u32, img_height: u32) -> Vec<Point<i32>> {
    let mut pts: Vec<Point<i32>> = points
        .iter()
        .map(|p| {
            Point::new(
                ((p[0] * img_width as f32) as i32).clamp(0, img_width as i32 - 1),
                ((p[1] * img_height as f32) as i32).clamp(0, img_height as i32 - 1),
            )
        })
        .collect();
    // The rasteriser treats the polygon as implicitly closed and rejects
    // an explicit duplicate closing vertex.
    if pts.len() >= 2 && pts.first() == pts.last() {
        pts.pop();
    }
    pts.dedup();
    pts
}

/// Render one room image: alpha-masked copy of the parent, cropped to the
/// polygon's bounding box.
pub fn render_room(parent: &DynamicImage, points: &[[f32; 2]]) -> DynamicImage {
    let (w, h) = (parent.width(), parent.height());
    let pts = polygon_pixels(points, w, h);

    let mut mask = GrayImage::new(w, h);
    draw_polygon_mut(&mut mask, &pts, Luma([255u8]));

    let mut rgba = parent.to_rgba8();
    for (x, y, pixel) in rgba.enumerate_pixels_mut() {
        if mask.get_pixel(x, y)[0] == 0 {
            pixel[3] = 0;
        }
    }

    let b = polygon_aabb(points, w, h);
    DynamicImage::ImageRgba8(rgba).crop_imm(b.x, b.y, b.width, b.height)
}

impl RegistryService {
    /// Extract rooms from one promoted asset.
    ///
    /// A degenerate polygon (fewer than three distinct vertices) or a
    /// missing parent image skips that room; the batch continues. Room
    /// entries are upserted by name so repeated extraction keeps ids.
    pub fn extract_rooms(
        &self,
        project_id: &str,
        asset_filename: &str,
        specs: &[RoomSpec],
    ) -> Result<Vec<Room>, PlanliftError> {
        let mut doc = self.saved(project_id)?;
        if doc.find_asset(asset_filename).is_none() {
            return Err(PlanliftError::AssetNotRegistered {
                project_id: project_id.to_string(),
                filename: asset_filename.to_string(),
            });
        }

        let parent_path = self.storage().assets_dir(project_id).join(asset_filename);
        if !parent_path.exists() {
            warn!(
                "Project '{}': asset file '{}' missing, skipping {} room(s)",
                project_id,
                asset_filename,
                specs.len()
            );
            return Ok(Vec::new());
        }
        let parent = image::open(&parent_path).map_err(|e| PlanliftError::ImageDecodeFailed {
            path: parent_path.clone(),
            detail: e.to_string(),
        })?;

        let rooms_dir = self.storage().rooms_dir(project_id);
        std::fs::create_dir_all(&rooms_dir).map_err(|e| PlanliftError::io(&rooms_dir, e))?;

        let mut results = Vec::new();
        for spec in specs {
            if polygon_pixels(&spec.points, parent.width(), parent.height()).len() < 3 {
                warn!(
                    "Project '{}': room '{}' polygon is degenerate, skipping",
                    project_id, spec.name
                );
                continue;
            }

            let asset = doc
                .find_asset_mut(asset_filename)
                .ok_or_else(|| PlanliftError::Internal("asset vanished mid-update".into()))?;
            let existing = asset.rooms.iter().find(|r| r.name == spec.name);
            let (room_id, created_at) = match existing {
                Some(r) => (r.id.clone(), r.created_at),
                None => (Uuid::new_v4().to_string(), Utc::now()),
            };

            let image = render_room(&parent, &spec.points);
            let filename = format!("{room_id}.png");
            let path = rooms_dir.join(&filename);
            image
                .save(&path)
                .map_err(|e| PlanliftError::ImageWriteFailed {
                    path: path.clone(),
                    detail: e.to_string(),
                })?;
            debug!(
                "Project '{}': room '{}' → {} ({}x{})",
                project_id,
                spec.name,
                filename,
                image.width(),
                image.height()
            );

            let room = Room {
                id: room_id,
                name: spec.name.clone(),
                polygon: spec.points.clone(),
                url: Storage::project_file_url(project_id, &format!("rooms/{filename}")),
                filename,
                created_at,
            };
            match asset.rooms.iter_mut().find(|r| r.id == room.id) {
                Some(slot) => *slot = room.clone(),
                None => asset.rooms.push(room.clone()),
            }
            results.push(room);
        }

        self.persist(&mut doc)?;
        info!(
            "Project '{}': {} room(s) extracted from '{}'",
            project_id,
            results.len(),
            asset_filename
        );
        Ok(results)
    }

    /// Delete one room: its image file (if present) and its entry in both
    /// representations.
    pub fn delete_room(&self, project_id: &str, room_id: &str) -> Result<(), PlanliftError> {
        let mut doc = self.saved(project_id)?;

        let mut filename = None;
        for asset in &mut doc.saved {
            if let Some(pos) = asset.rooms.iter().position(|r| r.id == room_id) {
                filename = Some(asset.rooms.remove(pos).filename);
                break;
            }
        }
        let Some(filename) = filename else {
            return Err(PlanliftError::RoomNotFound {
                id: room_id.to_string(),
            });
        };

        let path = self.storage().rooms_dir(project_id).join(&filename);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(PlanliftError::io(&path, e)),
        }

        self.persist(&mut doc)?;
        info!("Project '{}': room {} deleted", project_id, room_id);
        Ok(())
    }
}
