/// Actions an observer can take during a synthesis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Stop the run and report the best iterate found so far.
    StopEarly,
}
