//! Blocking event reading with resize-storm coalescing.

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{Event, KeyEvent, KeyEventKind, poll, read};

/// How long to keep draining once a resize arrives; window managers
/// deliver bursts of them while the user drags.
const RESIZE_SETTLE: Duration = Duration::from_millis(200);

/// Events the pager loop consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagerEvent {
    Key(KeyEvent),
    /// Final (columns, rows) after a resize burst settled.
    Resize(u16, u16),
}

/// Event source over the controlling terminal. The single suspension
/// point of the whole program is `next_event`'s blocking read.
#[derive(Default)]
pub struct Terminal {
    pending: VecDeque<PagerEvent>,
}

impl Terminal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block for the next event. A resize enters a 200 ms drain loop
    /// that swallows follow-up resizes and reports only the final
    /// geometry; keys arriving mid-drain are queued, not lost.
    pub fn next_event(&mut self) -> Result<PagerEvent> {
        if let Some(ev) = self.pending.pop_front() {
            return Ok(ev);
        }
        loop {
            match read()? {
                Event::Key(k) if k.kind != KeyEventKind::Release => {
                    return Ok(PagerEvent::Key(k));
                }
                Event::Resize(w, h) => {
                    return Ok(self.drain_resizes(w, h)?);
                }
                _ => continue,
            }
        }
    }

    fn drain_resizes(&mut self, mut w: u16, mut h: u16) -> Result<PagerEvent> {
        while poll(RESIZE_SETTLE)? {
            match read()? {
                Event::Resize(nw, nh) => {
                    w = nw;
                    h = nh;
                }
                Event::Key(k) if k.kind != KeyEventKind::Release => {
                    self.pending.push_back(PagerEvent::Key(k));
                }
                _ => {}
            }
        }
        Ok(PagerEvent::Resize(w, h))
    }
}
