//! Scene: an ordered group of cues for one segment of a show

use super::cue::Cue;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An ordered sequence of cues plus display metadata.
///
/// A cue belongs to exactly one scene; moving a cue between scenes is an
/// ownership transfer performed by the scene graph, never a shared
/// reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub notes: String,
    cues: Vec<Cue>,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            notes: String::new(),
            cues: Vec::new(),
        }
    }

    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub fn cue(&self, cue_id: Uuid) -> Option<&Cue> {
        self.cues.iter().find(|c| c.id == cue_id)
    }

    pub fn cue_mut(&mut self, cue_id: Uuid) -> Option<&mut Cue> {
        self.cues.iter_mut().find(|c| c.id == cue_id)
    }

    pub fn position(&self, cue_id: Uuid) -> Option<usize> {
        self.cues.iter().position(|c| c.id == cue_id)
    }

    /// Append a cue to the end of the scene
    pub fn push_cue(&mut self, cue: Cue) {
        self.cues.push(cue);
    }

    /// Insert a cue at an index (clamped to the scene length)
    pub fn insert_cue(&mut self, index: usize, cue: Cue) {
        let index = index.min(self.cues.len());
        self.cues.insert(index, cue);
    }

    /// Remove a cue, returning ownership to the caller
    pub fn take_cue(&mut self, cue_id: Uuid) -> Option<Cue> {
        let index = self.position(cue_id)?;
        Some(self.cues.remove(index))
    }

    /// Move a cue up (-1) or down (+1) within the scene.
    ///
    /// Returns false when the cue is absent or already at the edge.
    pub fn shift_cue(&mut self, cue_id: Uuid, delta: i64) -> bool {
        let Some(index) = self.position(cue_id) else {
            return false;
        };
        let target = index as i64 + delta;
        if target < 0 || target as usize >= self.cues.len() {
            return false;
        }
        self.cues.swap(index, target as usize);
        true
    }

    /// Cue following the given one in scene order (no wraparound)
    pub fn next_after(&self, cue_id: Uuid) -> Option<&Cue> {
        let index = self.position(cue_id)?;
        self.cues.get(index + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::show::CueKind;

    fn scene_with_cues(count: usize) -> (Scene, Vec<Uuid>) {
        let mut scene = Scene::new("Act 1");
        let mut ids = Vec::new();
        for i in 0..count {
            let cue = Cue::new(CueKind::Audio, format!("/media/track{}.mp3", i));
            ids.push(cue.id);
            scene.push_cue(cue);
        }
        (scene, ids)
    }

    #[test]
    fn test_push_and_lookup() {
        let (scene, ids) = scene_with_cues(3);
        assert_eq!(scene.len(), 3);
        assert_eq!(scene.position(ids[1]), Some(1));
        assert!(scene.cue(ids[2]).is_some());
    }

    #[test]
    fn test_take_cue_transfers_ownership() {
        let (mut scene, ids) = scene_with_cues(3);
        let cue = scene.take_cue(ids[1]).unwrap();
        assert_eq!(cue.id, ids[1]);
        assert_eq!(scene.len(), 2);
        assert!(scene.cue(ids[1]).is_none());
    }

    #[test]
    fn test_shift_cue_bounds() {
        let (mut scene, ids) = scene_with_cues(3);
        assert!(!scene.shift_cue(ids[0], -1));
        assert!(scene.shift_cue(ids[0], 1));
        assert_eq!(scene.position(ids[0]), Some(1));
        assert!(!scene.shift_cue(ids[2], 1));
    }

    #[test]
    fn test_next_after_no_wraparound() {
        let (scene, ids) = scene_with_cues(2);
        assert_eq!(scene.next_after(ids[0]).map(|c| c.id), Some(ids[1]));
        assert!(scene.next_after(ids[1]).is_none());
    }
}
