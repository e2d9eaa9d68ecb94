use std::collections::VecDeque;

use crate::canvas::RenderSurface;

// ============================================================================
// SNAPSHOT
// ============================================================================

/// A full copy of one surface's backing buffer (flat RGBA8).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pixels: Vec<u8>,
}

impl Snapshot {
    pub fn capture<S: RenderSurface>(surface: &S) -> Self {
        Self {
            pixels: surface.read_pixels(),
        }
    }

    /// Write the snapshot back. A size mismatch is refused by the surface.
    pub fn restore<S: RenderSurface>(&self, surface: &mut S) -> bool {
        surface.write_pixels(&self.pixels)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn memory_size(&self) -> usize {
        self.pixels.len()
    }
}

// ============================================================================
// HISTORY STACK - per-layer full-surface undo/redo
// ============================================================================

/// Linear undo/redo over full-surface snapshots.
///
/// `undo_stack[0]` is the floor: the surface as it was when the layer was
/// created. It is never popped and never pruned. Every entry above it is the
/// pre-edit state of one edit.
pub struct HistoryStack {
    undo_stack: VecDeque<Snapshot>,
    redo_stack: VecDeque<Snapshot>,
    /// Entries allowed above the floor. 0 = unlimited.
    max_steps: usize,
    /// Running memory total across both stacks.
    total_memory: usize,
}

impl HistoryStack {
    pub fn new<S: RenderSurface>(surface: &S) -> Self {
        let floor = Snapshot::capture(surface);
        let total_memory = floor.memory_size();
        let mut undo_stack = VecDeque::new();
        undo_stack.push_back(floor);
        Self {
            undo_stack,
            redo_stack: VecDeque::new(),
            max_steps: 0,
            total_memory,
        }
    }

    pub fn with_limit(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self.prune();
        self
    }

    pub fn set_limit(&mut self, max_steps: usize) {
        self.max_steps = max_steps;
        self.prune();
    }

    /// Record the pre-edit state. Call once before an edit starts mutating pixels.
    pub fn save_state<S: RenderSurface>(&mut self, surface: &S) {
        if !surface.is_ready() {
            return;
        }
        // A new edit invalidates everything that could be redone
        for snap in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(snap.memory_size());
        }
        let snap = Snapshot::capture(surface);
        self.total_memory += snap.memory_size();
        self.undo_stack.push_back(snap);
        self.prune();
    }

    /// Step back one edit. Returns `false` (and touches nothing) at the floor.
    pub fn undo<S: RenderSurface>(&mut self, surface: &mut S) -> bool {
        if self.undo_stack.len() <= 1 || !surface.is_ready() {
            return false;
        }
        let Some(previous) = self.undo_stack.pop_back() else { return false };
        self.total_memory = self.total_memory.saturating_sub(previous.memory_size());

        let current = Snapshot::capture(surface);
        self.total_memory += current.memory_size();
        self.redo_stack.push_back(current);

        previous.restore(surface);
        true
    }

    /// Re-apply the most recently undone edit. Returns `false` when nothing to redo.
    pub fn redo<S: RenderSurface>(&mut self, surface: &mut S) -> bool {
        if !surface.is_ready() {
            return false;
        }
        let Some(next) = self.redo_stack.pop_back() else { return false };
        self.total_memory = self.total_memory.saturating_sub(next.memory_size());

        let current = Snapshot::capture(surface);
        self.total_memory += current.memory_size();
        self.undo_stack.push_back(current);

        next.restore(surface);
        true
    }

    pub fn can_undo(&self) -> bool {
        self.undo_stack.len() > 1
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Undoable edits (the floor is not counted).
    pub fn undo_count(&self) -> usize {
        self.undo_stack.len().saturating_sub(1)
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Bytes held by both stacks (O(1) via cached total)
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    /// The state the surface started with.
    pub fn floor(&self) -> Option<&Snapshot> {
        self.undo_stack.front()
    }

    /// Drop the oldest edits above the floor until within the step limit.
    fn prune(&mut self) {
        if self.max_steps == 0 {
            return;
        }
        while self.undo_stack.len() > self.max_steps + 1 {
            if let Some(removed) = self.undo_stack.remove(1) {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::PixelSurface;
    use image::Rgba;

    fn surface() -> PixelSurface {
        PixelSurface::with_size(4, 4, 1.0)
    }

    #[test]
    fn undo_redo_round_trip_is_byte_exact() {
        let mut s = surface();
        let mut h = HistoryStack::new(&s);
        let before = s.read_pixels();

        h.save_state(&s);
        s.fill_rect(0.0, 0.0, 2.0, 2.0, Rgba([10, 20, 30, 255]), 1.0);
        let after = s.read_pixels();
        assert_ne!(before, after);

        assert!(h.undo(&mut s));
        assert_eq!(s.read_pixels(), before);
        assert!(h.redo(&mut s));
        assert_eq!(s.read_pixels(), after);
    }

    #[test]
    fn undo_at_floor_is_noop() {
        let mut s = surface();
        s.fill(Rgba([255, 255, 255, 255]));
        let mut h = HistoryStack::new(&s);
        let before = s.read_pixels();
        assert!(!h.undo(&mut s));
        assert_eq!(s.read_pixels(), before);
        assert!(!h.redo(&mut s));
        assert_eq!(h.undo_count(), 0);
    }

    #[test]
    fn new_edit_clears_redo() {
        let mut s = surface();
        let mut h = HistoryStack::new(&s);
        h.save_state(&s);
        s.fill(Rgba([1, 1, 1, 255]));
        h.undo(&mut s);
        assert_eq!(h.redo_count(), 1);

        h.save_state(&s);
        assert_eq!(h.redo_count(), 0);
        assert!(!h.redo(&mut s));
    }

    #[test]
    fn multiple_edits_unwind_in_order() {
        let mut s = surface();
        let mut h = HistoryStack::new(&s);
        let states: Vec<Vec<u8>> = (1..=3u8)
            .map(|v| {
                let pre = s.read_pixels();
                h.save_state(&s);
                s.fill(Rgba([v, v, v, 255]));
                pre
            })
            .collect();

        for pre in states.iter().rev() {
            assert!(h.undo(&mut s));
            assert_eq!(&s.read_pixels(), pre);
        }
        assert!(!h.undo(&mut s));
        assert_eq!(h.redo_count(), 3);
    }

    #[test]
    fn limit_discards_oldest_edit_but_keeps_floor() {
        let mut s = surface();
        let floor = s.read_pixels();
        let mut h = HistoryStack::new(&s).with_limit(2);
        for v in 1..=4u8 {
            h.save_state(&s);
            s.fill(Rgba([v, 0, 0, 255]));
        }
        assert_eq!(h.undo_count(), 2);
        assert_eq!(h.floor().map(|f| f.pixels().to_vec()), Some(floor));
        while h.undo(&mut s) {}
        // Oldest edits were pruned, so the earliest reachable state is the
        // pre-edit state of edit 3.
        assert_eq!(s.pixel(0, 0), Some([2, 0, 0, 255]));
    }

    #[test]
    fn memory_usage_tracks_both_stacks() {
        let mut s = surface();
        let mut h = HistoryStack::new(&s);
        let one = 4 * 4 * 4;
        assert_eq!(h.memory_usage(), one);
        h.save_state(&s);
        assert_eq!(h.memory_usage(), 2 * one);
        h.undo(&mut s);
        assert_eq!(h.memory_usage(), 2 * one);
        h.save_state(&s);
        assert_eq!(h.memory_usage(), 2 * one);
    }

    #[test]
    fn zero_sized_surface_is_skipped() {
        let mut s = PixelSurface::with_size(0, 0, 1.0);
        let mut h = HistoryStack::new(&s);
        h.save_state(&s);
        assert_eq!(h.undo_count(), 0);
        assert!(!h.undo(&mut s));
    }
}
