//! Project files: image paths, correspondences and the warp method, as JSON.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use rephoto_geometry::{
    Correspondence, CorrespondenceId, CorrespondenceKind, CorrespondenceStore, Point2,
    TransformKind,
};

/// Errors reading or writing a project file.
#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    /// The document parsed but its content is invalid.
    #[error("Invalid project file: {0}")]
    Format(String),

    /// The document is not valid project JSON.
    #[error("Malformed project file. {0}")]
    Json(#[from] serde_json::Error),

    /// The file could not be read or written.
    #[error("Failed to access the project file. {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointRecord {
    id: u64,
    ax: f64,
    ay: f64,
    bx: f64,
    by: f64,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineRecord {
    id: u64,
    ax0: f64,
    ay0: f64,
    ax1: f64,
    ay1: f64,
    bx0: f64,
    by0: f64,
    bx1: f64,
    by1: f64,
}

#[derive(Serialize, Deserialize)]
struct Corner {
    x: f64,
    y: f64,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FaceRecord {
    id: u64,
    corners_a: Vec<Corner>,
    corners_b: Vec<Corner>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectDocument {
    // the keys are required, an explicit null means no image
    #[serde(deserialize_with = "Option::deserialize")]
    image_a_path: Option<PathBuf>,
    #[serde(deserialize_with = "Option::deserialize")]
    image_b_path: Option<PathBuf>,
    points: Vec<PointRecord>,
    lines: Vec<LineRecord>,
    faces: Vec<FaceRecord>,
    #[serde(default)]
    warp_method: TransformKind,
    #[serde(default)]
    tps_smoothing: f64,
}

fn corners(records: &[Corner], side: &str, id: u64) -> Result<[Point2; 4], ProjectError> {
    let points: Vec<Point2> = records.iter().map(|c| [c.x, c.y]).collect();
    points.try_into().map_err(|v: Vec<Point2>| {
        ProjectError::Format(format!(
            "face {id} has {} corners on side {side}, expected 4",
            v.len()
        ))
    })
}

fn to_records(corners: &[Point2]) -> Vec<Corner> {
    corners.iter().map(|&[x, y]| Corner { x, y }).collect()
}

/// An alignment project: the two images, the correspondences and the warp settings.
#[derive(Clone, Debug, Default)]
pub struct Project {
    /// Path of the historical reference image.
    pub image_a_path: Option<PathBuf>,
    /// Path of the modern image.
    pub image_b_path: Option<PathBuf>,
    /// The correspondences, in insertion order.
    pub store: CorrespondenceStore,
    /// Transform family used for the warp.
    pub warp_method: TransformKind,
    /// Thin plate spline smoothing.
    pub tps_smoothing: f64,
}

impl Project {
    /// Parse a project from its JSON text.
    ///
    /// Correspondence order is recovered from the ids, which the store assigns monotonically.
    ///
    /// # Errors
    ///
    /// Malformed JSON, missing fields, non-finite coordinates, duplicated ids or faces
    /// without exactly 4 corners per side. Nothing is returned on failure.
    pub fn from_json_str(json: &str) -> Result<Self, ProjectError> {
        let doc: ProjectDocument = serde_json::from_str(json)?;

        if !(doc.tps_smoothing.is_finite() && doc.tps_smoothing >= 0.0) {
            return Err(ProjectError::Format(format!(
                "tpsSmoothing must be a non-negative number, got {}",
                doc.tps_smoothing
            )));
        }

        let mut entries =
            Vec::with_capacity(doc.points.len() + doc.lines.len() + doc.faces.len());
        for p in &doc.points {
            entries.push(Correspondence {
                id: CorrespondenceId(p.id),
                kind: CorrespondenceKind::Point {
                    a: [p.ax, p.ay],
                    b: [p.bx, p.by],
                },
            });
        }
        for l in &doc.lines {
            entries.push(Correspondence {
                id: CorrespondenceId(l.id),
                kind: CorrespondenceKind::Line {
                    a: [[l.ax0, l.ay0], [l.ax1, l.ay1]],
                    b: [[l.bx0, l.by0], [l.bx1, l.by1]],
                },
            });
        }
        for f in &doc.faces {
            entries.push(Correspondence {
                id: CorrespondenceId(f.id),
                kind: CorrespondenceKind::Face {
                    a: corners(&f.corners_a, "A", f.id)?,
                    b: corners(&f.corners_b, "B", f.id)?,
                },
            });
        }
        entries.sort_by_key(|e| e.id);

        let store = CorrespondenceStore::from_entries(entries)
            .map_err(|e| ProjectError::Format(e.to_string()))?;

        Ok(Self {
            image_a_path: doc.image_a_path,
            image_b_path: doc.image_b_path,
            store,
            warp_method: doc.warp_method,
            tps_smoothing: doc.tps_smoothing,
        })
    }

    /// Serialize the project to pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String, ProjectError> {
        let mut doc = ProjectDocument {
            image_a_path: self.image_a_path.clone(),
            image_b_path: self.image_b_path.clone(),
            points: Vec::new(),
            lines: Vec::new(),
            faces: Vec::new(),
            warp_method: self.warp_method,
            tps_smoothing: self.tps_smoothing,
        };

        for entry in self.store.iter() {
            let id = entry.id.0;
            match &entry.kind {
                CorrespondenceKind::Point { a, b } => doc.points.push(PointRecord {
                    id,
                    ax: a[0],
                    ay: a[1],
                    bx: b[0],
                    by: b[1],
                }),
                CorrespondenceKind::Line { a, b } => doc.lines.push(LineRecord {
                    id,
                    ax0: a[0][0],
                    ay0: a[0][1],
                    ax1: a[1][0],
                    ay1: a[1][1],
                    bx0: b[0][0],
                    by0: b[0][1],
                    bx1: b[1][0],
                    by1: b[1][1],
                }),
                CorrespondenceKind::Face { a, b } => doc.faces.push(FaceRecord {
                    id,
                    corners_a: to_records(a),
                    corners_b: to_records(b),
                }),
            }
        }

        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Read a project file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let project = Self::from_json_str(&json)?;
        log::info!(
            "loaded project {} with {} correspondences",
            path.display(),
            project.store.len()
        );
        Ok(project)
    }

    /// Write the project file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ProjectError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json_string()?)?;
        log::info!(
            "saved project {} with {} correspondences",
            path.display(),
            self.store.len()
        );
        Ok(())
    }

    /// Image paths resolved against `base`, usually the directory of the project file.
    pub fn resolved_image_paths(&self, base: &Path) -> (Option<PathBuf>, Option<PathBuf>) {
        let resolve = |p: &Option<PathBuf>| p.as_ref().map(|p| base.join(p));
        (resolve(&self.image_a_path), resolve(&self.image_b_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rephoto_geometry::Side;

    const SAMPLE: &str = r#"{
        "imageAPath": "old.jpg",
        "imageBPath": "new.jpg",
        "points": [{"id": 2, "ax": 1.0, "ay": 2.0, "bx": 3.0, "by": 4.0}],
        "lines": [{"id": 0, "ax0": 0, "ay0": 0, "ax1": 10, "ay1": 0,
                   "bx0": 1, "by0": 1, "bx1": 11, "by1": 1}],
        "faces": [{"id": 1,
                   "cornersA": [{"x": 0, "y": 0}, {"x": 5, "y": 0}, {"x": 5, "y": 5}, {"x": 0, "y": 5}],
                   "cornersB": [{"x": 1, "y": 1}, {"x": 6, "y": 1}, {"x": 6, "y": 6}, {"x": 1, "y": 6}]}],
        "warpMethod": "thinPlateSpline"
    }"#;

    #[test]
    fn load_recovers_order_from_ids() -> Result<(), ProjectError> {
        let project = Project::from_json_str(SAMPLE)?;
        let ids: Vec<u64> = project.store.iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(project.warp_method, TransformKind::ThinPlateSpline);
        assert_eq!(project.tps_smoothing, 0.0);

        let pairs = project.store.flatten_to_point_pairs();
        assert_eq!(pairs.len(), 2 + 4 + 1);
        assert_eq!(pairs[1].b, [11.0, 1.0]);
        assert_eq!(pairs[6].a, [1.0, 2.0]);
        Ok(())
    }

    #[test]
    fn save_is_inverse_of_load() -> Result<(), Box<dyn std::error::Error>> {
        let mut project = Project {
            image_a_path: Some("a.png".into()),
            ..Default::default()
        };
        let face = [[0.0, 0.0], [4.0, 0.0], [4.0, 3.0], [0.0, 3.0]];
        project.store.add_point([0.5, 0.25], [1.5, 1.25])?;
        let id = project.store.add_face(&face, &face)?;
        project.store.add_line([1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 5.0])?;
        project.store.update(id, Side::B, 3, [0.125, 3.5])?;
        project.tps_smoothing = 0.25;

        let back = Project::from_json_str(&project.to_json_string()?)?;
        let original: Vec<_> = project.store.iter().cloned().collect();
        let restored: Vec<_> = back.store.iter().cloned().collect();
        assert_eq!(original, restored);
        assert_eq!(back.image_a_path, project.image_a_path);
        assert_eq!(back.image_b_path, None);
        assert_eq!(back.tps_smoothing, 0.25);
        Ok(())
    }

    #[test]
    fn face_with_three_corners_fails() {
        let json = r#"{"imageAPath": null, "imageBPath": null, "points": [], "lines": [],
            "faces": [{"id": 0, "cornersA": [{"x": 0, "y": 0}, {"x": 1, "y": 0}, {"x": 1, "y": 1}],
                       "cornersB": [{"x": 0, "y": 0}, {"x": 1, "y": 0}, {"x": 1, "y": 1}, {"x": 0, "y": 1}]}]}"#;
        assert!(matches!(
            Project::from_json_str(json),
            Err(ProjectError::Format(_))
        ));
    }

    #[test]
    fn duplicated_ids_fail() {
        let json = r#"{"imageAPath": null, "imageBPath": null, "lines": [], "faces": [],
            "points": [{"id": 0, "ax": 0, "ay": 0, "bx": 0, "by": 0},
                       {"id": 0, "ax": 1, "ay": 1, "bx": 1, "by": 1}]}"#;
        assert!(matches!(
            Project::from_json_str(json),
            Err(ProjectError::Format(_))
        ));
    }

    #[test]
    fn missing_field_fails() {
        let json = r#"{"points": [{"id": 0, "ax": 0, "ay": 0, "bx": 0}]}"#;
        assert!(matches!(
            Project::from_json_str(json),
            Err(ProjectError::Json(_))
        ));
    }

    #[test]
    fn missing_top_level_keys_fail() {
        assert!(matches!(
            Project::from_json_str("{}"),
            Err(ProjectError::Json(_))
        ));

        let without_faces = r#"{"imageAPath": "a.png", "imageBPath": "b.png",
            "points": [], "lines": []}"#;
        assert!(matches!(
            Project::from_json_str(without_faces),
            Err(ProjectError::Json(_))
        ));

        let without_path = r#"{"imageBPath": "b.png", "points": [], "lines": [], "faces": []}"#;
        assert!(matches!(
            Project::from_json_str(without_path),
            Err(ProjectError::Json(_))
        ));
    }

    #[test]
    fn null_paths_and_default_settings_load() -> Result<(), ProjectError> {
        let json = r#"{"imageAPath": null, "imageBPath": null,
            "points": [], "lines": [], "faces": []}"#;
        let project = Project::from_json_str(json)?;
        assert!(project.store.is_empty());
        assert_eq!(project.image_a_path, None);
        assert_eq!(project.warp_method, TransformKind::Homography);
        assert_eq!(project.tps_smoothing, 0.0);
        Ok(())
    }

    #[test]
    fn file_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("project.json");
        std::fs::write(&path, SAMPLE)?;

        let project = Project::load(&path)?;
        project.save(&path)?;
        let again = Project::load(&path)?;
        assert_eq!(again.store.len(), 3);

        let (a, b) = again.resolved_image_paths(tmp_dir.path());
        assert_eq!(a, Some(tmp_dir.path().join("old.jpg")));
        assert_eq!(b, Some(tmp_dir.path().join("new.jpg")));
        Ok(())
    }
}
