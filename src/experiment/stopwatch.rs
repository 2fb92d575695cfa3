use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone)]
enum State {
  Stopped,
  Running(&'static str, Instant),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lap {
  pub phase: String,
  /// Milliseconds
  pub millis: u128,
}

/// Times consecutive pipeline phases.
pub struct Stopwatch {
  laps: Vec<Lap>,
  state: State,
}

impl Stopwatch {
  pub fn new() -> Self {
    Stopwatch { laps: Vec::new(), state: State::Stopped }
  }

  pub fn start(&mut self, phase: &'static str) {
    match &mut self.state {
      State::Running(..) => panic!("Stopwatch is already running"),
      state @ State::Stopped => *state = State::Running(phase, Instant::now()),
    }
  }

  /// Ends the current phase.  Does nothing when stopped, so an aborted pipeline can always be stopped.
  pub fn stop(&mut self) {
    if let State::Running(phase, start) = std::mem::replace(&mut self.state, State::Stopped) {
      self.laps.push(Lap { phase: phase.to_string(), millis: start.elapsed().as_millis() });
    }
  }

  pub fn lap(&mut self, phase: &'static str) {
    let t = Instant::now();
    match std::mem::replace(&mut self.state, State::Running(phase, t)) {
      State::Running(prev, start) => self.laps.push(Lap { phase: prev.to_string(), millis: t.duration_since(start).as_millis() }),
      State::Stopped => panic!("Stopwatch is stopped"),
    }
  }

  pub fn current_phase(&self) -> Option<&'static str> {
    match self.state {
      State::Running(phase, _) => Some(phase),
      State::Stopped => None,
    }
  }

  pub fn laps(&self) -> &[Lap] {
    &self.laps
  }

  /// Stops the running phase, if any, and returns every lap.
  pub fn into_laps(mut self) -> Vec<Lap> {
    self.stop();
    self.laps
  }
}

impl Default for Stopwatch {
  fn default() -> Self {
    Stopwatch::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn phases() {
    let mut s = Stopwatch::new();
    s.start("catalog");
    s.lap("distance");
    assert_eq!(s.current_phase(), Some("distance"));
    s.lap("build");
    s.stop();
    let laps = s.into_laps();
    let names: Vec<_> = laps.iter().map(|l| l.phase.as_str()).collect();
    assert_eq!(names, vec!["catalog", "distance", "build"]);
  }

  #[test]
  fn stopping_is_idempotent() {
    let mut s = Stopwatch::new();
    s.stop();
    s.start("solve");
    s.stop();
    s.stop();
    assert_eq!(s.laps().len(), 1);
    assert_eq!(s.current_phase(), None);
  }

  #[test]
  fn unfinished_phase_is_recorded() {
    let mut s = Stopwatch::new();
    s.start("extract");
    assert_eq!(s.into_laps().len(), 1);
  }

  #[test]
  #[should_panic]
  fn start_twice() {
    let mut s = Stopwatch::new();
    s.start("catalog");
    s.start("distance");
  }

  #[test]
  #[should_panic]
  fn lap_without_start() {
    let mut s = Stopwatch::new();
    s.lap("catalog");
  }
}
