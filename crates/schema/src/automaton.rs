//! A small NFA over child-element names, compiled from a content particle.

use crate::model::Particle;
use std::collections::HashSet;
use xylem_xdm::ExpandedName;

#[derive(Debug, Clone, Default)]
struct State {
    transitions: Vec<(ExpandedName, usize)>,
    epsilon: Vec<usize>,
}

/// Compiled content-model automaton. Stepping is a set-of-states walk, so
/// nondeterministic models (overlapping choices) need no determinization.
#[derive(Debug, Clone)]
pub struct ContentAutomaton {
    states: Vec<State>,
    start: usize,
    accept: usize,
    current: HashSet<usize>,
}

impl ContentAutomaton {
    pub fn compile(particle: &Particle) -> Self {
        let mut builder = Builder::default();
        let start = builder.state();
        let accept = builder.state();
        builder.fragment(particle, start, accept);
        let mut automaton = Self {
            states: builder.states,
            start,
            accept,
            current: HashSet::new(),
        };
        automaton.reset();
        automaton
    }

    pub fn reset(&mut self) {
        self.current = self.closure([self.start].into_iter().collect());
    }

    /// Advances on one child element. Returns false when the child is not
    /// allowed at this point; the automaton is then dead until reset.
    pub fn step(&mut self, name: &ExpandedName) -> bool {
        let mut next = HashSet::new();
        for &state in &self.current {
            for (label, target) in &self.states[state].transitions {
                if label == name {
                    next.insert(*target);
                }
            }
        }
        self.current = self.closure(next);
        !self.current.is_empty()
    }

    /// True when the content seen so far forms a complete match.
    pub fn is_complete(&self) -> bool {
        self.current.contains(&self.accept)
    }

    fn closure(&self, seed: HashSet<usize>) -> HashSet<usize> {
        let mut result = seed;
        let mut stack: Vec<usize> = result.iter().copied().collect();
        while let Some(state) = stack.pop() {
            for &target in &self.states[state].epsilon {
                if result.insert(target) {
                    stack.push(target);
                }
            }
        }
        result
    }
}

#[derive(Default)]
struct Builder {
    states: Vec<State>,
}

impl Builder {
    fn state(&mut self) -> usize {
        self.states.push(State::default());
        self.states.len() - 1
    }

    fn epsilon(&mut self, from: usize, to: usize) {
        self.states[from].epsilon.push(to);
    }

    fn symbol(&mut self, from: usize, name: &ExpandedName, to: usize) {
        self.states[from].transitions.push((name.clone(), to));
    }

    /// Thompson construction of `particle` between `entry` and `exit`.
    fn fragment(&mut self, particle: &Particle, entry: usize, exit: usize) {
        match particle {
            Particle::Element { name, min, max } => {
                self.occurrences(name, *min, *max, entry, exit);
            }
            Particle::Sequence(parts) => {
                let mut from = entry;
                for (i, part) in parts.iter().enumerate() {
                    let to = if i + 1 == parts.len() { exit } else { self.state() };
                    self.fragment(part, from, to);
                    from = to;
                }
                if parts.is_empty() {
                    self.epsilon(entry, exit);
                }
            }
            Particle::Choice(parts) => {
                if parts.is_empty() {
                    self.epsilon(entry, exit);
                }
                for part in parts {
                    let inner_entry = self.state();
                    let inner_exit = self.state();
                    self.epsilon(entry, inner_entry);
                    self.fragment(part, inner_entry, inner_exit);
                    self.epsilon(inner_exit, exit);
                }
            }
        }
    }

    fn occurrences(
        &mut self,
        name: &ExpandedName,
        min: u32,
        max: Option<u32>,
        entry: usize,
        exit: usize,
    ) {
        let mut from = entry;
        for _ in 0..min {
            let to = self.state();
            self.symbol(from, name, to);
            from = to;
        }
        match max {
            None => {
                // Unbounded tail: a self-loop.
                self.symbol(from, name, from);
                self.epsilon(from, exit);
            }
            Some(max) => {
                for _ in min..max {
                    self.epsilon(from, exit);
                    let to = self.state();
                    self.symbol(from, name, to);
                    from = to;
                }
                self.epsilon(from, exit);
            }
        }
    }
}
