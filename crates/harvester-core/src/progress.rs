use std::fmt::Write;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Fetch,
    Decode,
    Clone,
    Extract,
    Dedup,
    Group,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Fetch,
        Stage::Decode,
        Stage::Clone,
        Stage::Extract,
        Stage::Dedup,
        Stage::Group,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Stage::Fetch => "Stage 1 - Get Github Repos",
            Stage::Decode => "Stage 2 - Parse URLs",
            Stage::Clone => "Stage 3 - Clone Repos",
            Stage::Extract => "Stage 4 - Find Emails",
            Stage::Dedup => "Stage 5a - Dedup Emails",
            Stage::Group => "Stage 5b - Emails per Repo",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    fn is_aggregation(self) -> bool {
        matches!(self, Stage::Dedup | Stage::Group)
    }
}

/// Write-mostly telemetry for one stage; readers tolerate stale values.
#[derive(Debug, Default)]
pub struct StageCounters {
    active: AtomicU32,
    completed: AtomicU32,
    total: AtomicU32,
    errors: AtomicU32,
    skipped: AtomicU32,
}

impl StageCounters {
    pub fn start(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    /// Ends an in-flight unit successfully.
    pub fn finish(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Ends an in-flight unit with a failure.
    pub fn fail(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Ends an in-flight unit that was abandoned without being an error.
    pub fn abandon(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn complete(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn discover(&self, units: u32) {
        self.total.fetch_add(units, Ordering::Relaxed);
    }

    pub fn raise_total(&self, units: u32) {
        self.total.fetch_max(units, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StageSnapshot {
        StageSnapshot {
            active: self.active.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StageSnapshot {
    pub active: u32,
    pub completed: u32,
    pub total: u32,
    pub errors: u32,
    pub skipped: u32,
}

#[derive(Debug, Default)]
pub struct PipelineProgress {
    stages: [StageCounters; 6],
}

impl PipelineProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self, stage: Stage) -> &StageCounters {
        &self.stages[stage.index()]
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            stages: Stage::ALL.map(|stage| (stage, self.stage(stage).snapshot())),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ProgressSnapshot {
    stages: [(Stage, StageSnapshot); 6],
}

impl ProgressSnapshot {
    pub fn stage(&self, stage: Stage) -> StageSnapshot {
        self.stages[stage.index()].1
    }

    pub fn rows(&self) -> impl Iterator<Item = (Stage, StageSnapshot)> + '_ {
        self.stages.iter().copied()
    }
}

const HEADERS: [&str; 5] = ["Stage", "Active", "Completed", "Total", "Errors"];

pub fn render_table(snapshot: &ProgressSnapshot) -> String {
    let rows: Vec<[String; 5]> = snapshot
        .rows()
        .map(|(stage, counts)| {
            let (active, errors) = if stage.is_aggregation() {
                ("N/A".to_string(), "N/A".to_string())
            } else {
                (counts.active.to_string(), counts.errors.to_string())
            };
            [
                stage.label().to_string(),
                active,
                counts.completed.to_string(),
                counts.total.to_string(),
                errors,
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let header = HEADERS.map(str::to_string);
    for row in std::iter::once(&header).chain(rows.iter()) {
        let line = row
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        let _ = writeln!(out, "{}", line.trim_end());
    }
    out
}
