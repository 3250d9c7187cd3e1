use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use osrw::engine::progress::{Progress, ProgressCallback};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::warn;

/// Cells in the λ coverage strip drawn for each walker.
const STRIP_CELLS: usize = 20;
const STRIP_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

#[derive(Debug)]
pub enum UiEvent {
    Progress(Progress),
    Log(String),
}

/// Terminal view of a run: one line for the current phase and, while sampling, one line
/// per walker with its latest λ, its free-energy estimate and how evenly it has covered
/// [0, 1].
pub struct UiManager {
    display: MultiProgress,
    phase: Option<PhaseLine>,
    walkers: BTreeMap<usize, WalkerLine>,
    events: mpsc::Receiver<UiEvent>,
    shutdown: watch::Receiver<bool>,
    // Keeps the display alive between phases so log lines still print.
    anchor: ProgressBar,
}

struct PhaseLine {
    name: String,
    bar: ProgressBar,
}

struct WalkerLine {
    bar: ProgressBar,
    coverage: LambdaCoverage,
}

/// Status reports per λ cell, from which the coverage strip is drawn.
#[derive(Debug, Clone, Default, PartialEq)]
struct LambdaCoverage {
    visits: [u32; STRIP_CELLS],
}

impl LambdaCoverage {
    fn record(&mut self, lambda: f64) {
        let cell = ((lambda.clamp(0.0, 1.0) * STRIP_CELLS as f64) as usize).min(STRIP_CELLS - 1);
        self.visits[cell] = self.visits[cell].saturating_add(1);
    }

    fn total(&self) -> u64 {
        self.visits.iter().map(|&v| v as u64).sum()
    }

    /// Unvisited cells are dots; visited cells are scaled to the busiest one.
    fn strip(&self) -> String {
        let busiest = self.visits.iter().copied().max().unwrap_or(0) as u64;
        self.visits
            .iter()
            .map(|&visits| {
                if visits == 0 {
                    '·'
                } else {
                    let top = (STRIP_LEVELS.len() - 1) as u64;
                    STRIP_LEVELS[(visits as u64 * top / busiest) as usize]
                }
            })
            .collect()
    }
}

fn walker_message(rank: usize, lambda: f64, free_energy: f64, coverage: &LambdaCoverage) -> String {
    format!(
        "walker {rank:>3}  λ {lambda:6.4} [{}]  ΔG {free_energy:10.4} kcal/mol",
        coverage.strip()
    )
}

impl UiManager {
    pub fn new() -> (Self, mpsc::Sender<UiEvent>, watch::Sender<bool>) {
        let (event_sender, events) = mpsc::channel(1024);
        let (shutdown_sender, shutdown) = watch::channel(false);
        let display = MultiProgress::with_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        let anchor = display.add(ProgressBar::hidden());

        let manager = Self {
            display,
            phase: None,
            walkers: BTreeMap::new(),
            events,
            shutdown,
            anchor,
        };
        (manager, event_sender, shutdown_sender)
    }

    /// Renders events until shutdown is signalled, then flushes whatever is still queued.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
        self.retire_walkers();
        self.anchor.finish_and_clear();
    }

    fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Log(line) => self.print(line),
            UiEvent::Progress(progress) => self.handle_progress(progress),
        }
    }

    fn handle_progress(&mut self, progress: Progress) {
        match progress {
            Progress::PhaseStart { name } => {
                if let Some(previous) = self.phase.take() {
                    previous.bar.finish_and_clear();
                }
                let bar = self.display.add(ProgressBar::new_spinner());
                bar.set_style(Self::phase_style());
                bar.set_message(name.clone());
                bar.enable_steady_tick(Duration::from_millis(100));
                self.phase = Some(PhaseLine { name, bar });
            }
            Progress::PhaseFinish => {
                if let Some(phase) = self.phase.take() {
                    phase.bar.finish_and_clear();
                    self.print(format!("✓ {}", phase.name));
                }
            }
            Progress::TaskStart { total } => {
                if let Some(phase) = &self.phase {
                    phase.bar.disable_steady_tick();
                    phase.bar.set_style(Self::steps_style());
                    phase.bar.set_length(total);
                    phase.bar.set_position(0);
                }
            }
            Progress::TaskIncrement { amount } => {
                if let Some(phase) = &self.phase {
                    phase.bar.inc(amount);
                }
            }
            Progress::TaskFinish => {
                if let Some(phase) = &self.phase {
                    phase.bar.finish();
                }
                self.retire_walkers();
            }
            Progress::WalkerStatus {
                rank,
                lambda,
                free_energy,
            } => self.update_walker(rank, lambda, free_energy),
            Progress::Message(message) => self.print(format!("  {message}")),
        }
    }

    fn update_walker(&mut self, rank: usize, lambda: f64, free_energy: f64) {
        let display = &self.display;
        let line = self.walkers.entry(rank).or_insert_with(|| {
            let bar = display.add(ProgressBar::new_spinner());
            bar.set_style(Self::walker_style());
            WalkerLine {
                bar,
                coverage: LambdaCoverage::default(),
            }
        });
        line.coverage.record(lambda);
        line.bar
            .set_message(walker_message(rank, lambda, free_energy, &line.coverage));
    }

    /// Replaces the live walker lines with a one-line coverage summary each.
    fn retire_walkers(&mut self) {
        for (rank, line) in std::mem::take(&mut self.walkers) {
            line.bar.finish_and_clear();
            self.print(format!(
                "  walker {rank:>3} covered λ [{}] over {} reports",
                line.coverage.strip(),
                line.coverage.total()
            ));
        }
    }

    fn print(&self, line: String) {
        self.display.println(line).ok();
    }

    fn phase_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn steps_style() -> ProgressStyle {
        ProgressStyle::with_template("{msg:<10} {wide_bar:.green/black} {pos}/{len} steps ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }

    fn walker_style() -> ProgressStyle {
        ProgressStyle::with_template("  {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
    }
}

/// Forwards workflow progress to the UI task. Step increments may be dropped when the
/// channel is full; a closed channel is reported once per event.
pub fn progress_callback(sender: mpsc::Sender<UiEvent>) -> ProgressCallback<'static> {
    Box::new(move |progress: Progress| {
        if let Err(mpsc::error::TrySendError::Closed(_)) =
            sender.try_send(UiEvent::Progress(progress))
        {
            warn!("Progress event dropped: the UI has already shut down.");
        }
    })
}
