// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! Read-region bookkeeping for `read_file`.
//!
//! Per file, a sorted set of disjoint inclusive line intervals, each
//! stamped with the turn that last touched it.  The session bumps the turn
//! counter once per loop round, so the stamps record how stale each cached
//! region is.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// One tracked inclusive line interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedRegion {
    pub start: u32,
    pub end: u32,
    pub last_use_turn: u32,
}

impl TrackedRegion {
    fn new(start: u32, end: u32, last_use_turn: u32) -> Self {
        Self {
            start,
            end,
            last_use_turn,
        }
    }
}

/// Fold a new read `[start, end]` at `turn` into an existing region set.
///
/// - Existing regions partially overlapped by the new read are split; the
///   retained outside pieces keep their old turn stamp.
/// - Overlapped lines keep the *most recent* stamp — re-reading at an older
///   turn never downgrades a newer one.
/// - Lines of the new read not previously tracked get the current turn.
/// - The result is sorted by start and coalesced, merging adjacent regions
///   only when they share an identical turn stamp.
pub fn add_region(
    existing: &[TrackedRegion],
    start: u32,
    end: u32,
    turn: u32,
) -> Vec<TrackedRegion> {
    debug_assert!(start <= end, "inverted region {start}..{end}");
    let mut pieces: Vec<TrackedRegion> = Vec::with_capacity(existing.len() + 2);

    // Overlapped slices of existing regions, to compute the uncovered gaps
    // of the new read afterwards.
    let mut covered: Vec<(u32, u32)> = Vec::new();

    for r in existing {
        if r.end < start || r.start > end {
            pieces.push(*r);
            continue;
        }
        // Retained outside pieces keep the old stamp.
        if r.start < start {
            pieces.push(TrackedRegion::new(r.start, start - 1, r.last_use_turn));
        }
        if r.end > end {
            pieces.push(TrackedRegion::new(end + 1, r.end, r.last_use_turn));
        }
        let ov_start = r.start.max(start);
        let ov_end = r.end.min(end);
        pieces.push(TrackedRegion::new(
            ov_start,
            ov_end,
            r.last_use_turn.max(turn),
        ));
        covered.push((ov_start, ov_end));
    }

    // Gaps of [start, end] not covered by any existing region.
    covered.sort_unstable();
    let mut cursor = start;
    for (c_start, c_end) in covered {
        if c_start > cursor {
            pieces.push(TrackedRegion::new(cursor, c_start - 1, turn));
        }
        cursor = cursor.max(c_end.saturating_add(1));
        if cursor > end {
            break;
        }
    }
    if cursor <= end {
        pieces.push(TrackedRegion::new(cursor, end, turn));
    }

    pieces.sort_by_key(|r| r.start);

    // Coalesce: merge adjacent regions only under the equal-turn rule.
    let mut out: Vec<TrackedRegion> = Vec::with_capacity(pieces.len());
    for piece in pieces {
        match out.last_mut() {
            Some(prev)
                if prev.last_use_turn == piece.last_use_turn
                    && prev.end.saturating_add(1) >= piece.start =>
            {
                prev.end = prev.end.max(piece.end);
            }
            _ => out.push(piece),
        }
    }
    out
}

/// Shared per-session tracker: regions per file plus the current turn.
#[derive(Default)]
pub struct RegionTracker {
    files: Mutex<HashMap<PathBuf, Vec<TrackedRegion>>>,
    turn: AtomicU32,
}

impl RegionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the session at the top of every loop round.
    pub fn set_turn(&self, turn: u32) {
        self.turn.store(turn, Ordering::SeqCst);
    }

    pub fn current_turn(&self) -> u32 {
        self.turn.load(Ordering::SeqCst)
    }

    /// Record a read of `[start, end]` in `path` at the current turn.
    pub fn record(&self, path: &Path, start: u32, end: u32) {
        let turn = self.current_turn();
        let mut files = self.files.lock().unwrap();
        let regions = files.entry(path.to_path_buf()).or_default();
        *regions = add_region(regions, start, end, turn);
    }

    pub fn regions(&self, path: &Path) -> Vec<TrackedRegion> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop all state; used when a session is reset for the fix path.
    pub fn clear(&self) {
        self.files.lock().unwrap().clear();
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
