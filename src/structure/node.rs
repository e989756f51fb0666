// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Lifecycle shared by every structure node
//!
//! A node is `Invalid` when created, becomes `Valid` after a successful
//! validation, drops back to `Invalid` whenever it is invalidated and ends in
//! `Disposed`, which is terminal.

use crate::error::{RegistryError, Result};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

/// Node kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructureKind {
    /// Context scope
    Context,
    /// Domain scope
    Domain,
    /// Package scope
    Package,
    /// Folder scope
    Folder,
    /// Feature structure
    Feature,
    /// Plain attribute structure
    Attribute,
    /// Geometry attribute structure
    Geometry,
}

impl fmt::Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StructureKind::Context => "context",
            StructureKind::Domain => "domain",
            StructureKind::Package => "package",
            StructureKind::Folder => "folder",
            StructureKind::Feature => "feature",
            StructureKind::Attribute => "attribute",
            StructureKind::Geometry => "geometry",
        };
        write!(f, "{name}")
    }
}

/// Node state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Not validated against the live model, or invalidated since
    Invalid,
    /// Validated
    Valid,
    /// Disposed; terminal
    Disposed,
}

impl NodeState {
    fn to_u8(self) -> u8 {
        match self {
            NodeState::Invalid => 0,
            NodeState::Valid => 1,
            NodeState::Disposed => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => NodeState::Valid,
            2 => NodeState::Disposed,
            _ => NodeState::Invalid,
        }
    }
}

/// Mutable property reported by a [`ChangeEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeProperty {
    /// Spatial reference ID
    Srid,
    /// Name of the default geometry
    DefaultGeometryName,
}

/// Notification fired after a named mutable property changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Name of the node that changed
    pub node: String,
    /// Property that changed
    pub property: ChangeProperty,
    /// Previous value
    pub old_value: Option<String>,
    /// New value
    pub new_value: Option<String>,
}

/// Handle returned by [`Lifecycle::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Change listener callback
pub type Listener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// State machine and event channel embedded in every node
pub struct Lifecycle {
    kind: StructureKind,
    state: AtomicU8,
    next_listener: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl Lifecycle {
    /// Create an invalid node of the given kind
    pub fn new(kind: StructureKind) -> Self {
        Self::with_state(kind, NodeState::Invalid)
    }

    /// Create a node in a given state. Used by copies.
    pub fn with_state(kind: StructureKind, state: NodeState) -> Self {
        Self {
            kind,
            state: AtomicU8::new(state.to_u8()),
            next_listener: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Node kind
    pub fn kind(&self) -> StructureKind {
        self.kind
    }

    /// Current state
    pub fn state(&self) -> NodeState {
        NodeState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Check if the node is valid
    pub fn is_valid(&self) -> bool {
        self.state() == NodeState::Valid
    }

    /// Check if the node is disposed
    pub fn is_disposed(&self) -> bool {
        self.state() == NodeState::Disposed
    }

    /// Transition to `Valid`. Returns `false` if the node is disposed.
    pub fn mark_valid(&self) -> bool {
        self.transition(NodeState::Valid)
    }

    /// Transition to `Invalid`. Disposed nodes stay disposed.
    pub fn invalidate(&self) {
        self.transition(NodeState::Invalid);
    }

    fn transition(&self, to: NodeState) -> bool {
        let disposed = NodeState::Disposed.to_u8();
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != disposed).then_some(to.to_u8())
            })
            .is_ok()
    }

    /// Transition to `Disposed` and drop every listener. Returns `true` only
    /// for the call that performed the transition.
    pub fn dispose(&self) -> bool {
        let previous = self
            .state
            .swap(NodeState::Disposed.to_u8(), Ordering::AcqRel);
        if previous == NodeState::Disposed.to_u8() {
            return false;
        }
        self.listeners.write().clear();
        true
    }

    /// Fail with a state error if the node is disposed, or not valid when
    /// `require_valid` is set
    pub fn verify(&self, name: &str, require_valid: bool) -> Result<()> {
        match self.state() {
            NodeState::Disposed => Err(RegistryError::state(format!(
                "{} {name} is disposed",
                self.kind
            ))),
            NodeState::Invalid if require_valid => Err(RegistryError::state(format!(
                "{} {name} is not valid",
                self.kind
            ))),
            _ => Ok(()),
        }
    }

    /// Register a change listener. Listeners must be removed by their owner;
    /// disposal drops whatever is left.
    pub fn add_listener(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        if !self.is_disposed() {
            self.listeners.write().push((id, listener));
        }
        id
    }

    /// Remove a change listener
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver an event to every listener
    pub fn notify(&self, event: &ChangeEvent) {
        // Listeners may register or remove listeners themselves
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}

/// Behavior common to every structure node
pub trait StructureNode {
    /// Embedded lifecycle
    fn lifecycle(&self) -> &Lifecycle;

    /// Node name, used in messages and status context
    fn name(&self) -> &str;

    /// Kind-specific availability condition
    fn has_content(&self) -> bool {
        true
    }

    /// Invalidate this node, and its children when `deep` is set
    fn invalidate(&self, deep: bool);

    /// Dispose this node and its children. Idempotent.
    fn dispose(&self);

    /// Node kind
    fn kind(&self) -> StructureKind {
        self.lifecycle().kind()
    }

    /// Check if the node is valid
    fn is_valid(&self) -> bool {
        self.lifecycle().is_valid()
    }

    /// Check if the node is disposed
    fn is_disposed(&self) -> bool {
        self.lifecycle().is_disposed()
    }

    /// Valid, not disposed and holding kind-specific content
    fn is_available(&self) -> bool {
        self.is_valid() && !self.is_disposed() && self.has_content()
    }

    /// Fail with a state error if the node cannot be used
    fn verify(&self, require_valid: bool) -> Result<()> {
        self.lifecycle().verify(self.name(), require_valid)
    }

    /// Register a change listener
    fn add_listener(&self, listener: Listener) -> ListenerId {
        self.lifecycle().add_listener(listener)
    }

    /// Remove a change listener
    fn remove_listener(&self, id: ListenerId) -> bool {
        self.lifecycle().remove_listener(id)
    }
}
