//! Single-line stderr spinner shared by every long-running stage.
//!
//! Only the most recently started task is drawn. Rendering is off unless
//! stderr is a terminal; `WHEELHOUSE_PROGRESS=0|1` overrides the detection.

use std::collections::BTreeMap;
use std::env;
use std::io::{self, IsTerminal, Write};
use std::sync::{Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

const FRAMES: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
const TICK: Duration = Duration::from_millis(80);
/// Tasks that finish faster than this never draw.
const GRACE: Duration = Duration::from_millis(120);
const CLEAR_LINE: &[u8] = b"\r\x1b[2K";

pub(crate) fn progress_enabled() -> bool {
    env::var("WHEELHOUSE_PROGRESS").map_or_else(|_| io::stderr().is_terminal(), |raw| raw != "0")
}

static STDERR_LINE: Mutex<()> = Mutex::new(());
static BOARD: OnceLock<Board> = OnceLock::new();

fn board() -> &'static Board {
    BOARD.get_or_init(Board::default)
}

fn write_stderr(bytes: &[u8]) {
    let _line = STDERR_LINE.lock().ok();
    let mut stderr = io::stderr().lock();
    let _ = stderr.write_all(bytes);
    let _ = stderr.flush();
}

#[derive(Debug, Clone)]
struct Task {
    label: String,
    total: Option<usize>,
    done: usize,
    since: Instant,
}

impl Task {
    fn render(&self, frame: char) -> String {
        let elapsed = self.since.elapsed().as_secs();
        let counter = self
            .total
            .map(|total| format!(" [{}/{total}]", self.done.min(total)))
            .unwrap_or_default();
        let clock = if elapsed > 0 {
            format!(" {elapsed}s")
        } else {
            String::new()
        };
        format!("wheelhouse ▸ {}{counter}{clock} {frame}", self.label)
    }
}

#[derive(Default)]
struct BoardState {
    last_id: u64,
    paused: usize,
    drawing: bool,
    tasks: BTreeMap<u64, Task>,
}

#[derive(Default)]
struct Board {
    state: Mutex<BoardState>,
}

impl Board {
    fn with_task(&self, id: u64, edit: impl FnOnce(&mut Task)) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(task) = state.tasks.get_mut(&id) {
                edit(task);
            }
        }
    }

    fn register(&self, label: String, total: Option<usize>) -> Option<u64> {
        let mut state = self.state.lock().ok()?;
        state.last_id += 1;
        let id = state.last_id;
        state.tasks.insert(
            id,
            Task {
                label,
                total,
                done: 0,
                since: Instant::now(),
            },
        );
        let spawn = !state.drawing;
        state.drawing = true;
        drop(state);
        if spawn {
            thread::spawn(draw_forever);
        }
        Some(id)
    }

    fn retire(&self, id: u64) {
        if let Ok(mut state) = self.state.lock() {
            state.tasks.remove(&id);
        }
    }

    #[cfg(test)]
    fn task(&self, id: u64) -> Option<Task> {
        self.state.lock().ok()?.tasks.get(&id).cloned()
    }

    fn pause(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.paused += 1;
        }
    }

    fn unpause(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.paused = state.paused.saturating_sub(1);
        }
    }

    /// The task to draw right now, if any.
    fn visible(&self) -> Option<Option<Task>> {
        let state = self.state.lock().ok()?;
        if state.paused > 0 {
            return Some(None);
        }
        Some(
            state
                .tasks
                .values()
                .next_back()
                .filter(|task| task.since.elapsed() >= GRACE)
                .cloned(),
        )
    }
}

fn draw_forever() {
    let mut frames = FRAMES.iter().copied().cycle();
    let mut dirty = false;
    // A poisoned board lock ends the renderer.
    while let Some(visible) = board().visible() {
        match visible.filter(|_| progress_enabled()) {
            Some(task) => {
                let frame = frames.next().unwrap_or(FRAMES[0]);
                let mut line = CLEAR_LINE.to_vec();
                line.extend_from_slice(task.render(frame).as_bytes());
                write_stderr(&line);
                dirty = true;
            }
            None if dirty => {
                write_stderr(CLEAR_LINE);
                dirty = false;
            }
            None => {}
        }
        thread::sleep(TICK);
    }
}

/// Hides the spinner while a child process writes to the terminal.
pub(crate) struct ProgressSuspendGuard {
    enabled: bool,
}

impl ProgressSuspendGuard {
    pub(crate) fn new() -> Self {
        let enabled = progress_enabled();
        if enabled {
            board().pause();
            write_stderr(CLEAR_LINE);
        }
        Self { enabled }
    }
}

impl Drop for ProgressSuspendGuard {
    fn drop(&mut self) {
        if self.enabled {
            board().unpause();
        }
    }
}

/// Handle on one line of progress. Dropping it clears the line.
pub struct ProgressReporter {
    id: Option<u64>,
}

impl ProgressReporter {
    pub fn spinner(label: impl Into<String>) -> Self {
        Self::start(label.into(), None)
    }

    /// A counted bar; an empty total falls back to a plain spinner.
    pub fn bar(label: impl Into<String>, total: usize) -> Self {
        Self::start(label.into(), (total > 0).then_some(total))
    }

    fn start(label: String, total: Option<usize>) -> Self {
        let id = if progress_enabled() {
            board().register(label, total)
        } else {
            None
        };
        Self { id }
    }

    pub fn increment(&self) {
        if let Some(id) = self.id {
            board().with_task(id, |task| task.done += 1);
        }
    }

    pub fn set_label(&self, label: impl Into<String>) {
        if let Some(id) = self.id {
            let label = label.into();
            board().with_task(id, |task| task.label = label);
        }
    }

    /// Clears the line and leaves `message` in its place.
    pub fn finish(mut self, message: impl Into<String>) {
        if self.clear() {
            eprintln!("wheelhouse ▸ {}", message.into());
        }
    }

    fn clear(&mut self) -> bool {
        let Some(id) = self.id.take() else {
            return false;
        };
        board().retire(id);
        write_stderr(CLEAR_LINE);
        true
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.clear();
    }
}
