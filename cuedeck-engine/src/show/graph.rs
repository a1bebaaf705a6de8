//! Scene graph: scene order, selection cursors and the show snapshot
//!
//! Owns the "current scene" / "current cue" cursors and every structural
//! edit. Mutated only from the engine control task.

use super::cue::Cue;
use super::scene::Scene;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Serializable show content handed to the persistence collaborator.
///
/// Selection cursors and deck assignments are runtime state and are not
/// part of the snapshot; restoring selects the first scene, matching
/// engine start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowSnapshot {
    pub scenes: Vec<Scene>,
}

/// The ordered collection of scenes plus selection state.
pub struct SceneGraph {
    scenes: Vec<Scene>,
    selected_scene: Option<Uuid>,
    selected_cue: Option<Uuid>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self {
            scenes: Vec::new(),
            selected_scene: None,
            selected_cue: None,
        }
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn selected_scene_id(&self) -> Option<Uuid> {
        self.selected_scene
    }

    pub fn selected_cue_id(&self) -> Option<Uuid> {
        self.selected_cue
    }

    pub fn scene(&self, scene_id: Uuid) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id == scene_id)
    }

    pub fn scene_mut(&mut self, scene_id: Uuid) -> Option<&mut Scene> {
        self.scenes.iter_mut().find(|s| s.id == scene_id)
    }

    pub fn selected_scene(&self) -> Option<&Scene> {
        self.selected_scene.and_then(|id| self.scene(id))
    }

    pub fn selected_cue(&self) -> Option<&Cue> {
        let scene = self.selected_scene()?;
        scene.cue(self.selected_cue?)
    }

    /// Locate a cue anywhere in the show
    pub fn find_cue(&self, cue_id: Uuid) -> Option<(&Scene, &Cue)> {
        self.scenes.iter().find_map(|scene| {
            scene.cue(cue_id).map(|cue| (scene, cue))
        })
    }

    pub fn find_cue_mut(&mut self, cue_id: Uuid) -> Option<&mut Cue> {
        self.scenes.iter_mut().find_map(|scene| scene.cue_mut(cue_id))
    }

    /// Create a scene at the end of the show.
    ///
    /// The first scene ever added becomes the selection, matching the
    /// engine-start rule.
    pub fn add_scene(&mut self, name: impl Into<String>) -> Uuid {
        let scene = Scene::new(name);
        let id = scene.id;
        self.scenes.push(scene);
        if self.selected_scene.is_none() {
            self.selected_scene = Some(id);
        }
        id
    }

    /// Select a scene. Cue selection resets to the scene's first cue when
    /// `auto_select_first_cue` is set, otherwise clears.
    pub fn select_scene(&mut self, scene_id: Uuid, auto_select_first_cue: bool) -> Result<()> {
        let scene = self
            .scene(scene_id)
            .ok_or_else(|| Error::NotFound(format!("scene {}", scene_id)))?;
        let first_cue = scene.cues().first().map(|c| c.id);
        self.selected_scene = Some(scene_id);
        self.selected_cue = if auto_select_first_cue { first_cue } else { None };
        Ok(())
    }

    /// Remove a scene and every cue it owns.
    ///
    /// Removing the active scene selects a deterministic neighbor: the
    /// previous scene when one exists, else the next, else nothing.
    pub fn remove_scene(&mut self, scene_id: Uuid, auto_select_first_cue: bool) -> Result<Scene> {
        let index = self
            .scenes
            .iter()
            .position(|s| s.id == scene_id)
            .ok_or_else(|| Error::NotFound(format!("scene {}", scene_id)))?;
        let removed = self.scenes.remove(index);

        if self.selected_scene == Some(scene_id) {
            let neighbor = if index > 0 {
                self.scenes.get(index - 1)
            } else {
                self.scenes.get(index)
            };
            match neighbor.map(|s| s.id) {
                Some(id) => self.select_scene(id, auto_select_first_cue)?,
                None => {
                    self.selected_scene = None;
                    self.selected_cue = None;
                }
            }
        }
        Ok(removed)
    }

    /// Select a cue; scene selection follows the cue's owner.
    pub fn select_cue(&mut self, cue_id: Uuid) -> Result<Uuid> {
        let (scene, _) = self
            .find_cue(cue_id)
            .ok_or_else(|| Error::NotFound(format!("cue {}", cue_id)))?;
        let scene_id = scene.id;
        self.selected_scene = Some(scene_id);
        self.selected_cue = Some(cue_id);
        Ok(scene_id)
    }

    /// Add a cue to a scene (end of scene order)
    pub fn add_cue(&mut self, scene_id: Uuid, cue: Cue) -> Result<()> {
        let scene = self
            .scene_mut(scene_id)
            .ok_or_else(|| Error::NotFound(format!("scene {}", scene_id)))?;
        scene.push_cue(cue);
        Ok(())
    }

    /// Remove a cue from its scene.
    ///
    /// When the removed cue was selected, selection falls to the cue that
    /// took its index, else the previous cue, else nothing.
    pub fn remove_cue(&mut self, cue_id: Uuid) -> Result<Cue> {
        let scene = self
            .scenes
            .iter_mut()
            .find(|s| s.cue(cue_id).is_some())
            .ok_or_else(|| Error::NotFound(format!("cue {}", cue_id)))?;
        let index = scene.position(cue_id).expect("cue present in owner scene");
        let removed = scene.take_cue(cue_id).expect("cue present in owner scene");

        if self.selected_cue == Some(cue_id) {
            let next_id = self.selected_scene().and_then(|scene| {
                scene
                    .cues()
                    .get(index)
                    .or_else(|| scene.cues().get(index.wrapping_sub(1)))
                    .map(|c| c.id)
            });
            self.selected_cue = next_id;
        }
        Ok(removed)
    }

    /// Transfer a cue to another scene at the given index.
    ///
    /// Ownership moves atomically; the cue never exists in two scenes.
    pub fn move_cue(&mut self, cue_id: Uuid, target_scene: Uuid, index: usize) -> Result<()> {
        if self.scene(target_scene).is_none() {
            return Err(Error::NotFound(format!("scene {}", target_scene)));
        }
        let cue = {
            let scene = self
                .scenes
                .iter_mut()
                .find(|s| s.cue(cue_id).is_some())
                .ok_or_else(|| Error::NotFound(format!("cue {}", cue_id)))?;
            scene.take_cue(cue_id).expect("cue present in owner scene")
        };
        let target = self.scene_mut(target_scene).expect("checked above");
        target.insert_cue(index, cue);
        Ok(())
    }

    /// Reorder a cue within its scene
    pub fn shift_cue(&mut self, cue_id: Uuid, delta: i64) -> Result<bool> {
        let scene = self
            .scenes
            .iter_mut()
            .find(|s| s.cue(cue_id).is_some())
            .ok_or_else(|| Error::NotFound(format!("cue {}", cue_id)))?;
        Ok(scene.shift_cue(cue_id, delta))
    }

    /// The cue after the given one in its scene, or None at the end
    /// (no wraparound)
    pub fn next_cue_after(&self, cue_id: Uuid) -> Option<&Cue> {
        let (scene, _) = self.find_cue(cue_id)?;
        scene.next_after(cue_id)
    }

    /// Snapshot the show content for the persistence collaborator
    pub fn snapshot(&self) -> ShowSnapshot {
        ShowSnapshot {
            scenes: self.scenes.clone(),
        }
    }

    /// Replace the show content from a snapshot.
    ///
    /// Selection resets as at engine start: first scene selected, cue
    /// selection per the auto-select flag.
    pub fn restore(&mut self, snapshot: ShowSnapshot, auto_select_first_cue: bool) {
        self.scenes = snapshot.scenes;
        self.selected_scene = None;
        self.selected_cue = None;
        if let Some(first) = self.scenes.first().map(|s| s.id) {
            // Infallible: the scene was just installed
            let _ = self.select_scene(first, auto_select_first_cue);
        }
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::show::CueKind;

    fn graph_with_two_scenes() -> (SceneGraph, Uuid, Uuid, Vec<Uuid>) {
        let mut graph = SceneGraph::new();
        let s1 = graph.add_scene("Opening");
        let s2 = graph.add_scene("Act 1");
        let mut cue_ids = Vec::new();
        for i in 0..3 {
            let cue = Cue::new(CueKind::Audio, format!("/media/a{}.mp3", i));
            cue_ids.push(cue.id);
            graph.add_cue(s1, cue).unwrap();
        }
        (graph, s1, s2, cue_ids)
    }

    #[test]
    fn test_first_scene_auto_selected() {
        let mut graph = SceneGraph::new();
        assert!(graph.selected_scene_id().is_none());
        let s1 = graph.add_scene("Opening");
        let _s2 = graph.add_scene("Act 1");
        assert_eq!(graph.selected_scene_id(), Some(s1));
    }

    #[test]
    fn test_select_scene_resets_cue_cursor() {
        let (mut graph, s1, s2, cue_ids) = graph_with_two_scenes();
        graph.select_cue(cue_ids[2]).unwrap();
        assert_eq!(graph.selected_cue_id(), Some(cue_ids[2]));

        graph.select_scene(s2, true).unwrap();
        // Empty scene: nothing to auto-select
        assert_eq!(graph.selected_cue_id(), None);

        graph.select_scene(s1, true).unwrap();
        assert_eq!(graph.selected_cue_id(), Some(cue_ids[0]));

        graph.select_scene(s1, false).unwrap();
        assert_eq!(graph.selected_cue_id(), None);
    }

    #[test]
    fn test_remove_active_scene_selects_previous_then_next() {
        let mut graph = SceneGraph::new();
        let s1 = graph.add_scene("One");
        let s2 = graph.add_scene("Two");
        let s3 = graph.add_scene("Three");

        graph.select_scene(s2, false).unwrap();
        graph.remove_scene(s2, false).unwrap();
        // Previous exists
        assert_eq!(graph.selected_scene_id(), Some(s1));

        graph.remove_scene(s1, false).unwrap();
        // No previous: next
        assert_eq!(graph.selected_scene_id(), Some(s3));

        graph.remove_scene(s3, false).unwrap();
        assert_eq!(graph.selected_scene_id(), None);
        assert_eq!(graph.selected_cue_id(), None);
    }

    #[test]
    fn test_remove_inactive_scene_keeps_selection() {
        let (mut graph, s1, s2, _) = graph_with_two_scenes();
        assert_eq!(graph.selected_scene_id(), Some(s1));
        graph.remove_scene(s2, false).unwrap();
        assert_eq!(graph.selected_scene_id(), Some(s1));
    }

    #[test]
    fn test_select_cue_follows_owner_scene() {
        let (mut graph, s1, s2, cue_ids) = graph_with_two_scenes();
        graph.select_scene(s2, false).unwrap();
        graph.select_cue(cue_ids[1]).unwrap();
        assert_eq!(graph.selected_scene_id(), Some(s1));
        assert_eq!(graph.selected_cue_id(), Some(cue_ids[1]));
    }

    #[test]
    fn test_remove_selected_cue_falls_to_neighbor() {
        let (mut graph, _s1, _s2, cue_ids) = graph_with_two_scenes();
        graph.select_cue(cue_ids[1]).unwrap();
        graph.remove_cue(cue_ids[1]).unwrap();
        // The cue that took index 1
        assert_eq!(graph.selected_cue_id(), Some(cue_ids[2]));

        graph.remove_cue(cue_ids[2]).unwrap();
        assert_eq!(graph.selected_cue_id(), Some(cue_ids[0]));

        graph.remove_cue(cue_ids[0]).unwrap();
        assert_eq!(graph.selected_cue_id(), None);
    }

    #[test]
    fn test_move_cue_between_scenes() {
        let (mut graph, s1, s2, cue_ids) = graph_with_two_scenes();
        graph.move_cue(cue_ids[0], s2, 0).unwrap();
        assert_eq!(graph.scene(s1).unwrap().len(), 2);
        assert_eq!(graph.scene(s2).unwrap().len(), 1);
        // Owned by exactly one scene
        assert_eq!(graph.find_cue(cue_ids[0]).unwrap().0.id, s2);
    }

    #[test]
    fn test_next_cue_no_wraparound() {
        let (graph, _s1, _s2, cue_ids) = graph_with_two_scenes();
        assert_eq!(
            graph.next_cue_after(cue_ids[0]).map(|c| c.id),
            Some(cue_ids[1])
        );
        assert!(graph.next_cue_after(cue_ids[2]).is_none());
    }

    #[test]
    fn test_snapshot_roundtrip_preserves_order_and_trim() {
        let (mut graph, s1, _s2, cue_ids) = graph_with_two_scenes();
        graph
            .find_cue_mut(cue_ids[1])
            .unwrap()
            .set_trim(2.5, Some(12.25))
            .unwrap();

        let json = serde_json::to_string(&graph.snapshot()).unwrap();
        let snapshot: ShowSnapshot = serde_json::from_str(&json).unwrap();

        let mut restored = SceneGraph::new();
        restored.restore(snapshot, true);

        assert_eq!(restored.scenes().len(), 2);
        assert_eq!(restored.scenes()[0].id, s1);
        let cues: Vec<Uuid> = restored.scenes()[0].cues().iter().map(|c| c.id).collect();
        assert_eq!(cues, cue_ids);
        let cue = restored.find_cue(cue_ids[1]).unwrap().1;
        assert_eq!(cue.start_offset(), 2.5);
        assert_eq!(cue.stop_offset(), Some(12.25));

        // Restore selects the first scene and its first cue
        assert_eq!(restored.selected_scene_id(), Some(s1));
        assert_eq!(restored.selected_cue_id(), Some(cue_ids[0]));
    }
}
