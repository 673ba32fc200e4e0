//! SZ-003: Execution stack — the chain of currently open units.
//!
//! An owned, ordered list replaces parent back-references. The bottom of the
//! stack is the file itself, which is never popped while scanning; it only
//! carries the top-level subindent.

/// One open unit and its indentation bookkeeping.
#[derive(Debug)]
pub struct Frame<T> {
    /// Indentation of the line that opened this unit.
    pub indent: usize,
    /// Indentation of this unit's children, fixed by its first child line.
    pub subindent: Option<usize>,
    /// Set once a nested directive has been opened under this unit.
    pub nested: bool,
    pub item: T,
}

/// Stack of open units above the file level.
#[derive(Debug)]
pub struct ExecutionStack<T> {
    root_subindent: Option<usize>,
    frames: Vec<Frame<T>>,
}

impl<T> Default for ExecutionStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ExecutionStack<T> {
    pub fn new() -> Self {
        Self {
            root_subindent: None,
            frames: Vec::new(),
        }
    }

    /// Number of open units (the file itself not counted).
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// True when the file is the active unit.
    pub fn is_top_level(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn top(&self) -> Option<&Frame<T>> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Frame<T>> {
        self.frames.last_mut()
    }

    /// Open a unit at `indent` as a child of the active one.
    pub fn push(&mut self, indent: usize, item: T) {
        if let Some(parent) = self.frames.last_mut() {
            parent.nested = true;
        }
        self.frames.push(Frame {
            indent,
            subindent: None,
            nested: false,
            item,
        });
    }

    /// Pop the innermost unit if its own indent is `>= level`.
    ///
    /// Call in a loop to close every stanza a line at `level` ends; afterwards
    /// the active unit's indent is strictly below `level`.
    pub fn pop_at_or_above(&mut self, level: usize) -> Option<Frame<T>> {
        match self.frames.last() {
            Some(frame) if frame.indent >= level => self.frames.pop(),
            _ => None,
        }
    }

    /// Pop the innermost unit unconditionally.
    pub fn pop(&mut self) -> Option<Frame<T>> {
        self.frames.pop()
    }

    /// Record or check the active unit's subindent against a line at `level`.
    ///
    /// The first child line fixes the subindent; later lines must match it.
    /// On mismatch returns the established subindent.
    pub fn bind_subindent(&mut self, level: usize) -> Result<(), usize> {
        let slot = match self.frames.last_mut() {
            Some(frame) => &mut frame.subindent,
            None => &mut self.root_subindent,
        };
        match *slot {
            None => {
                *slot = Some(level);
                Ok(())
            }
            Some(expected) if expected == level => Ok(()),
            Some(expected) => Err(expected),
        }
    }

    /// Open units, outermost first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Frame<T>> {
        self.frames.iter()
    }
}
