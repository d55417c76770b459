// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Concrete events and the event graph
//!
//! The event graph is the input of model inference: one node per observed
//! event, and one or more labeled relations between events. Each relation
//! has designated initial and terminal events.
//!
//! Event graphs are immutable once built. They are constructed with an
//! [EventGraphBuilder] or directly from label sequences with
//! [EventGraph::from_traces].
//!

use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
};

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Label of the synthetic event that precedes every trace
pub const INITIAL_LABEL: &str = "INITIAL";

/// Label of the synthetic event that follows every trace
pub const TERMINAL_LABEL: &str = "TERMINAL";

/// Name of the time relation used by [EventGraph::from_traces]
pub const TIME_RELATION: &str = "t";

///
/// Index of an event in an event graph
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u32);

impl EventId {
    /// Index of this event, usable to address per-event arrays
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

///
/// Name of a relation between events
///
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Relation(String);

impl Relation {
    /// Relation with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Relation(name.into())
    }

    /// The default time relation
    pub fn time() -> Self {
        Relation(TIME_RELATION.to_string())
    }

    /// Name of this relation
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Default for Relation {
    fn default() -> Self {
        Relation::time()
    }
}

impl From<&str> for Relation {
    fn from(name: &str) -> Self {
        Relation::new(name)
    }
}

impl Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

///
/// Typed event argument
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventArg {
    /// Integer argument
    Int(i64),
    /// String argument
    Str(String),
}

///
/// Time stamp of an event
/// - a scalar time is a single integer
/// - a vector time is a vector clock, one entry per process
///
/// Times are only used to order events within a trace.
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Time {
    /// Totally ordered time
    Scalar(i64),
    /// Vector clock
    Vector(Vec<u64>),
}

impl Time {
    ///
    /// Compare two time values
    /// - return Ok(Some(ordering)) if the times are ordered
    /// - return Ok(None) for concurrent vector clocks
    /// - return an error if the two values have different representations
    ///   or if the vector clocks have different widths
    ///
    pub fn try_cmp(&self, other: &Time) -> Result<Option<Ordering>> {
        match (self, other) {
            (Time::Scalar(x), Time::Scalar(y)) => Ok(Some(x.cmp(y))),
            (Time::Vector(x), Time::Vector(y)) if x.len() == y.len() => {
                let mut less = false;
                let mut greater = false;
                for (a, b) in x.iter().zip(y) {
                    match a.cmp(b) {
                        Ordering::Less => less = true,
                        Ordering::Greater => greater = true,
                        Ordering::Equal => {}
                    }
                }
                Ok(match (less, greater) {
                    (false, false) => Some(Ordering::Equal),
                    (true, false) => Some(Ordering::Less),
                    (false, true) => Some(Ordering::Greater),
                    (true, true) => None,
                })
            }
            _ => Err(Error::IncomparableTimes {
                left: self.to_string(),
                right: other.to_string(),
            }),
        }
    }
}

impl Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Time::Scalar(x) => write!(f, "{x}"),
            Time::Vector(v) => {
                write!(f, "[")?;
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{x}")?;
                }
                write!(f, "]")
            }
        }
    }
}

///
/// An observed event
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    label: String,
    #[serde(default)]
    args: Vec<EventArg>,
    #[serde(default)]
    time: Option<Time>,
}

impl Event {
    /// Event with the given label, no arguments, and no time
    pub fn new(label: impl Into<String>) -> Self {
        Event {
            label: label.into(),
            args: Vec::new(),
            time: None,
        }
    }

    /// Attach a time stamp
    pub fn with_time(mut self, time: Time) -> Self {
        self.time = Some(time);
        self
    }

    /// Add an argument
    pub fn with_arg(mut self, arg: EventArg) -> Self {
        self.args.push(arg);
        self
    }

    /// Label (event type)
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Arguments
    pub fn args(&self) -> &[EventArg] {
        &self.args
    }

    /// Time stamp if any
    pub fn time(&self) -> Option<&Time> {
        self.time.as_ref()
    }
}

///
/// A transition between two concrete events
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Source event
    pub source: EventId,
    /// Target event
    pub target: EventId,
    /// Relation this transition belongs to
    pub relation: Relation,
    /// Number of times this transition was observed
    pub weight: u32,
}

///
/// Graph of concrete events
///
#[derive(Debug, Clone)]
pub struct EventGraph {
    events: Vec<Event>,
    // outgoing[i] = transitions whose source is event i
    outgoing: Vec<Vec<Transition>>,
    // incoming[i] = transitions whose target is event i
    incoming: Vec<Vec<Transition>>,
    initial: BTreeMap<Relation, Vec<EventId>>,
    terminal: BTreeMap<Relation, BTreeSet<EventId>>,
    relations: BTreeSet<Relation>,
}

impl EventGraph {
    ///
    /// Build a graph from label sequences
    /// - one synthetic INITIAL event precedes all traces
    /// - one synthetic TERMINAL event follows all traces
    /// - consecutive events are linked by the time relation
    /// - the last event of every trace is terminal, and so is the TERMINAL event
    ///
    pub fn from_traces<S: AsRef<str>>(traces: &[Vec<S>]) -> Result<EventGraph> {
        let traces: Vec<Vec<Event>> = traces
            .iter()
            .map(|t| t.iter().map(|s| Event::new(s.as_ref())).collect())
            .collect();
        Self::from_event_traces(traces)
    }

    ///
    /// Build a graph from timed traces
    ///
    /// Events of each trace are first sorted by time. All events must carry
    /// a time stamp and the times of one trace must be totally ordered.
    ///
    pub fn from_timed_traces(traces: Vec<Vec<Event>>) -> Result<EventGraph> {
        let mut ordered = Vec::with_capacity(traces.len());
        for (i, trace) in traces.into_iter().enumerate() {
            ordered.push(order_trace(i, trace)?);
        }
        Self::from_event_traces(ordered)
    }

    fn from_event_traces(traces: Vec<Vec<Event>>) -> Result<EventGraph> {
        let relation = Relation::time();
        let mut builder = EventGraphBuilder::new();
        let initial = builder.add_event(Event::new(INITIAL_LABEL));
        let terminal = builder.add_event(Event::new(TERMINAL_LABEL));
        builder.mark_initial(initial, &relation);
        builder.mark_terminal(terminal, &relation);
        for trace in traces {
            let mut previous = initial;
            for event in trace {
                let id = builder.add_event(event);
                builder.add_transition(previous, id, &relation);
                previous = id;
            }
            if previous != initial {
                builder.mark_terminal(previous, &relation);
            }
            builder.add_transition(previous, terminal, &relation);
        }
        builder.build()
    }

    /// Number of events
    pub fn num_events(&self) -> usize {
        self.events.len()
    }

    /// Iterator over all event ids
    pub fn event_ids(&self) -> impl Iterator<Item = EventId> {
        (0..self.events.len() as u32).map(EventId)
    }

    /// Event of the given id
    pub fn event(&self, id: EventId) -> &Event {
        &self.events[id.index()]
    }

    /// Label of the given event
    pub fn label(&self, id: EventId) -> &str {
        self.events[id.index()].label()
    }

    /// All relations that occur in this graph
    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.iter()
    }

    /// Outgoing transitions of an event, all relations included
    pub fn transitions(&self, id: EventId) -> &[Transition] {
        &self.outgoing[id.index()]
    }

    /// Successors of an event in a relation
    pub fn successors<'a>(
        &'a self,
        id: EventId,
        relation: &'a Relation,
    ) -> impl Iterator<Item = EventId> + 'a {
        self.outgoing[id.index()]
            .iter()
            .filter(move |t| &t.relation == relation)
            .map(|t| t.target)
    }

    /// Predecessors of an event in a relation
    pub fn predecessors<'a>(
        &'a self,
        id: EventId,
        relation: &'a Relation,
    ) -> impl Iterator<Item = EventId> + 'a {
        self.incoming[id.index()]
            .iter()
            .filter(move |t| &t.relation == relation)
            .map(|t| t.source)
    }

    /// Initial events of a relation
    pub fn initial_events(&self, relation: &Relation) -> &[EventId] {
        self.initial
            .get(relation)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Check whether an event is terminal in a relation
    pub fn is_terminal(&self, id: EventId, relation: &Relation) -> bool {
        self.terminal
            .get(relation)
            .is_some_and(|set| set.contains(&id))
    }

    /// Check whether an event is initial in some relation
    pub fn is_initial(&self, id: EventId) -> bool {
        self.initial.values().any(|v| v.contains(&id))
    }
}

// Insertion sort of a trace by time, failing on incomparable or equal times
fn order_trace(trace: usize, events: Vec<Event>) -> Result<Vec<Event>> {
    let mut sorted: Vec<Event> = Vec::with_capacity(events.len());
    for event in events {
        let time = event.time().ok_or_else(|| Error::IncomparableTimes {
            left: event.label().to_string(),
            right: "untimed".to_string(),
        })?;
        let mut pos = sorted.len();
        while pos > 0 {
            let other = &sorted[pos - 1];
            // all events in sorted have a time
            let other_time = other.time().ok_or_else(|| Error::IncomparableTimes {
                left: other.label().to_string(),
                right: "untimed".to_string(),
            })?;
            match time.try_cmp(other_time)? {
                Some(Ordering::Less) => pos -= 1,
                Some(Ordering::Greater) => break,
                _ => {
                    return Err(Error::UnorderedEvents {
                        trace,
                        left: other.label().to_string(),
                        right: event.label().to_string(),
                    })
                }
            }
        }
        sorted.insert(pos, event);
    }
    Ok(sorted)
}

///
/// Builder for event graphs
///
/// Transitions and initial/terminal markings may refer to events in any
/// order; they are validated when the graph is built.
///
#[derive(Debug, Default)]
pub struct EventGraphBuilder {
    events: Vec<Event>,
    transitions: Vec<Transition>,
    initial: BTreeMap<Relation, BTreeSet<EventId>>,
    terminal: BTreeMap<Relation, BTreeSet<EventId>>,
}

impl EventGraphBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event and return its id
    pub fn add_event(&mut self, event: Event) -> EventId {
        let id = EventId(self.events.len() as u32);
        self.events.push(event);
        id
    }

    /// Add a transition of weight 1
    pub fn add_transition(
        &mut self,
        source: EventId,
        target: EventId,
        relation: &Relation,
    ) -> &mut Self {
        self.add_weighted_transition(source, target, relation, 1)
    }

    /// Add a transition with an explicit weight
    pub fn add_weighted_transition(
        &mut self,
        source: EventId,
        target: EventId,
        relation: &Relation,
        weight: u32,
    ) -> &mut Self {
        self.transitions.push(Transition {
            source,
            target,
            relation: relation.clone(),
            weight,
        });
        self
    }

    /// Mark an event as initial in a relation
    pub fn mark_initial(&mut self, id: EventId, relation: &Relation) -> &mut Self {
        self.initial.entry(relation.clone()).or_default().insert(id);
        self
    }

    /// Mark an event as terminal in a relation
    pub fn mark_terminal(&mut self, id: EventId, relation: &Relation) -> &mut Self {
        self.terminal.entry(relation.clone()).or_default().insert(id);
        self
    }

    ///
    /// Build the graph
    /// - fails if a transition or marking refers to an unknown event
    /// - fails if an initial event has an incoming transition in its relation
    ///
    pub fn build(self) -> Result<EventGraph> {
        let n = self.events.len();
        let check = |id: EventId| {
            if id.index() < n {
                Ok(())
            } else {
                Err(Error::UnknownEvent(id.0))
            }
        };

        let mut outgoing = vec![Vec::new(); n];
        let mut incoming = vec![Vec::new(); n];
        let mut relations = BTreeSet::new();
        for t in self.transitions {
            check(t.source)?;
            check(t.target)?;
            relations.insert(t.relation.clone());
            incoming[t.target.index()].push(t.clone());
            outgoing[t.source.index()].push(t);
        }

        let mut initial = BTreeMap::new();
        for (relation, ids) in self.initial {
            for &id in &ids {
                check(id)?;
                if incoming[id.index()].iter().any(|t| t.relation == relation) {
                    return Err(Error::InitialHasIncoming {
                        event: id.0,
                        relation: relation.to_string(),
                    });
                }
            }
            relations.insert(relation.clone());
            initial.insert(relation, ids.into_iter().collect());
        }
        for ids in self.terminal.values() {
            for &id in ids {
                check(id)?;
            }
        }

        Ok(EventGraph {
            events: self.events,
            outgoing,
            incoming,
            initial,
            terminal: self.terminal,
            relations,
        })
    }
}

impl Display for EventGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for id in self.event_ids() {
            write!(f, "{id} {}:", self.label(id))?;
            for t in self.transitions(id) {
                write!(f, " -{}-> {}", t.relation, t.target)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
