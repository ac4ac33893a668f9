//! Scene time unit overrides.

use animbatch_scene::{SceneError, SceneGraph, SceneResult};

/// Frame rate assumed when the scene cannot report one.
pub const DEFAULT_FPS: f64 = 30.0;

/// Time unit names to try for a frame rate, preferred first.
///
/// 30 and 60 prefer the exact `30fps`/`60fps` units and fall back to the
/// legacy `ntsc`/`ntscf` aliases.
pub fn unit_candidates(fps: f64) -> Vec<String> {
    let rounded = (fps + 0.5) as i64;
    match rounded {
        24 => vec!["film".into()],
        25 => vec!["pal".into()],
        30 => vec!["30fps".into(), "ntsc".into()],
        48 => vec!["show".into()],
        50 => vec!["palf".into()],
        60 => vec!["60fps".into(), "ntscf".into()],
        n => vec![format!("{}fps", n)],
    }
}

/// Switches the scene to `fps` and returns the previous unit for
/// [`restore_scene_time_unit`].
pub fn set_scene_time_unit<S: SceneGraph + ?Sized>(scene: &mut S, fps: f64) -> SceneResult<String> {
    let previous = scene.time_unit();
    let mut last_err = None;
    for unit in unit_candidates(fps) {
        match scene.set_time_unit(&unit) {
            Ok(()) => {
                tracing::debug!(unit = %unit, previous = %previous, "time unit set");
                return Ok(previous);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| SceneError::command(format!("No time unit for {} fps", fps))))
}

/// Restores a unit returned by [`set_scene_time_unit`]. Empty means nothing
/// to restore.
pub fn restore_scene_time_unit<S: SceneGraph + ?Sized>(scene: &mut S, previous: &str) -> SceneResult<()> {
    if previous.is_empty() {
        return Ok(());
    }
    scene.set_time_unit(previous)
}

/// Scene frame rate, or [`DEFAULT_FPS`] when unknown.
pub fn scene_fps<S: SceneGraph + ?Sized>(scene: &S) -> f64 {
    scene.fps().filter(|f| *f > 0.0).unwrap_or(DEFAULT_FPS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use animbatch_scene::MemoryScene;

    #[test]
    fn test_unit_candidates() {
        assert_eq!(unit_candidates(24.0), vec!["film"]);
        assert_eq!(unit_candidates(25.0), vec!["pal"]);
        assert_eq!(unit_candidates(29.97), vec!["30fps", "ntsc"]);
        assert_eq!(unit_candidates(60.0), vec!["60fps", "ntscf"]);
        assert_eq!(unit_candidates(48.0), vec!["show"]);
        assert_eq!(unit_candidates(50.0), vec!["palf"]);
        assert_eq!(unit_candidates(12.0), vec!["12fps"]);
    }

    #[test]
    fn test_set_and_restore() {
        let mut scene = MemoryScene::new("shot.ma");
        assert_eq!(scene.time_unit(), "film");
        let previous = set_scene_time_unit(&mut scene, 30.0).unwrap();
        assert_eq!(previous, "film");
        assert_eq!(scene.time_unit(), "30fps");
        assert_eq!(scene_fps(&scene), 30.0);
        restore_scene_time_unit(&mut scene, &previous).unwrap();
        assert_eq!(scene.time_unit(), "film");
        assert_eq!(scene_fps(&scene), 24.0);
    }

    #[test]
    fn test_empty_previous_is_a_no_op() {
        let mut scene = MemoryScene::new("shot.ma");
        restore_scene_time_unit(&mut scene, "").unwrap();
        assert_eq!(scene.time_unit(), "film");
    }
}
