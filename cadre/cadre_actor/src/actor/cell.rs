//! The runtime record behind every actor.
//!
//! A cell owns the actor instance, its mailbox and its place in the
//! supervision tree. All lifecycle transitions happen here, driven by
//! control messages processed on the actor's own mailbox run, so they never
//! interleave with a user message of the same actor.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use cadre_core::{ActorError, ActorId};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, trace};
use parking_lot::Mutex;

use super::{Actor, ActorContext, LifecycleState, Kill, PoisonPill, Props, Terminated};
use crate::mailbox::{Envelope, Mailbox, MessageInvoker, SystemMessage};
use crate::supervision::{self, Effect, RestartHistory};
use crate::system::SystemInner;

/// Work deferred until every child has terminated.
enum Pending {
    Create,
    Recreate(Arc<ActorError>),
    Terminate,
}

struct CellState {
    actor: Option<Box<dyn Actor>>,
    /// The envelope being processed; kept after a failure for `pre_restart`
    current_message: Option<Envelope>,
    child_restarts: HashMap<ActorId, RestartHistory>,
    pending: Option<Pending>,
}

pub(crate) struct ActorCell {
    id: ActorId,
    name: String,
    parent: Option<ActorId>,
    props: Props,
    mailbox: Arc<Mailbox>,
    system: Weak<SystemInner>,
    lifecycle: Mutex<LifecycleState>,
    terminating: AtomicBool,
    children: Mutex<Vec<ActorId>>,
    watchers: Mutex<HashSet<ActorId>>,
    watching: Mutex<HashSet<ActorId>>,
    termination_listeners: Mutex<Vec<Sender<ActorId>>>,
    state: Mutex<CellState>,
}

impl ActorCell {
    pub(crate) fn new(
        id: ActorId,
        name: String,
        parent: Option<ActorId>,
        props: Props,
        mailbox: Arc<Mailbox>,
        system: Weak<SystemInner>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            name,
            parent,
            props,
            mailbox,
            system,
            lifecycle: Mutex::new(LifecycleState::Created),
            terminating: AtomicBool::new(false),
            children: Mutex::new(Vec::new()),
            watchers: Mutex::new(HashSet::new()),
            watching: Mutex::new(HashSet::new()),
            termination_listeners: Mutex::new(Vec::new()),
            state: Mutex::new(CellState {
                actor: None,
                current_message: None,
                child_restarts: HashMap::new(),
                pending: None,
            }),
        })
    }

    pub(crate) fn id(&self) -> ActorId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn parent(&self) -> Option<ActorId> {
        self.parent
    }

    pub(crate) fn system(&self) -> Option<Arc<SystemInner>> {
        self.system.upgrade()
    }

    pub(crate) fn children(&self) -> Vec<ActorId> {
        self.children.lock().clone()
    }

    pub(crate) fn lifecycle(&self) -> LifecycleState {
        *self.lifecycle.lock()
    }

    fn set_lifecycle(&self, state: LifecycleState) {
        let mut lifecycle = self.lifecycle.lock();
        trace!("{}: {} -> {}", self, *lifecycle, state);
        *lifecycle = state;
    }

    fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::Acquire)
    }

    /// Register a child. Refused once this actor has started terminating.
    pub(crate) fn add_child(&self, child: ActorId) -> bool {
        let mut children = self.children.lock();
        if self.is_terminating() || self.lifecycle() == LifecycleState::Terminated {
            return false;
        }
        children.push(child);
        true
    }

    pub(crate) fn termination(&self) -> Receiver<ActorId> {
        let (sender, receiver) = bounded(1);
        let mut listeners = self.termination_listeners.lock();
        if self.lifecycle() == LifecycleState::Terminated {
            let _ = sender.send(self.id);
        } else {
            listeners.push(sender);
        }
        receiver
    }

    /// Post to this actor's mailbox, redirecting refused messages.
    pub(crate) fn post(&self, envelope: Envelope) {
        let Err(error) = self.mailbox.post(envelope) else {
            return;
        };
        // A rejected run leaves the message queued; the mailbox logged it.
        let Some(envelope) = error.into_envelope() else {
            return;
        };
        match envelope.into_system() {
            Ok(message) => match self.system() {
                Some(system) => system.undeliverable(self.id, message),
                None => trace!("{}: dropping {:?}", self, message),
            },
            Err(envelope) => match self.system() {
                Some(system) => system.dead_letter(self.id, envelope),
                None => trace!("{}: dropping {:?}", self, envelope),
            },
        }
    }

    pub(crate) fn send_system(&self, message: SystemMessage) {
        self.post(Envelope::system(message));
    }

    fn send_to(&self, target: ActorId, message: SystemMessage) {
        if let Some(system) = self.system() {
            system.send_system(target, message);
        }
    }

    fn tell_children(&self, message: &SystemMessage) {
        for child in self.children() {
            self.send_to(child, message.clone());
        }
    }

    pub(crate) fn watch(&self, target: &ActorCell) {
        if self.watching.lock().insert(target.id) {
            target.send_system(SystemMessage::Watch { watcher: self.id });
        }
    }

    pub(crate) fn unwatch(&self, target: &ActorCell) {
        if self.watching.lock().remove(&target.id) {
            target.send_system(SystemMessage::Unwatch { watcher: self.id });
        }
    }

    fn create(self: &Arc<Self>) {
        if self.lifecycle() != LifecycleState::Created {
            return;
        }

        let result = {
            let mut state = self.state.lock();
            let actor = state.actor.insert(self.props.recipe().create());
            actor.pre_start(&mut ActorContext::new(self))
        };

        match result {
            Ok(()) => {
                self.set_lifecycle(LifecycleState::Started);
                debug!("{}: started", self);
            }
            Err(e) => {
                error!("{}: pre_start failed: {}", self, e);
                self.fail(Arc::new(ActorError::Initialization(e.to_string())));
            }
        }
    }

    /// Suspend and hand the failure to the supervisor.
    fn fail(self: &Arc<Self>, cause: Arc<ActorError>) {
        if self.is_terminating() {
            debug!("{}: ignoring failure while terminating: {}", self, cause);
            return;
        }

        self.mailbox.suspend();
        self.tell_children(&SystemMessage::Suspend);

        let Some(system) = self.system() else {
            return;
        };
        match self.parent {
            Some(parent) => system.send_system(
                parent,
                SystemMessage::Failed {
                    child: self.id,
                    cause,
                },
            ),
            None => system.handle_root_failure(self.id, cause),
        }
    }

    fn suspend(&self) {
        self.mailbox.suspend();
        self.tell_children(&SystemMessage::Suspend);
    }

    fn resume(self: &Arc<Self>) {
        if self.is_terminating() {
            return;
        }
        if self.lifecycle() == LifecycleState::Created {
            // pre_start never completed, so there is nothing to resume
            self.create_again();
            return;
        }
        // The failed message, if any, counts as consumed
        self.state.lock().current_message = None;
        self.mailbox.resume();
        self.tell_children(&SystemMessage::Resume);
    }

    /// Discard an instance whose `pre_start` failed and build a new one once
    /// the children it spawned are gone.
    fn create_again(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            state.actor = None;
            state.current_message = None;
        }

        let children = self.children();
        if children.is_empty() {
            self.finish_create();
            return;
        }

        debug!("{}: stopping {} children before creating again", self, children.len());
        self.state.lock().pending = Some(Pending::Create);
        for child in children {
            self.send_to(child, SystemMessage::Terminate);
        }
    }

    fn finish_create(self: &Arc<Self>) {
        self.state.lock().pending = None;
        self.create();
        if self.lifecycle() == LifecycleState::Started {
            self.mailbox.resume();
        }
    }

    fn recreate(self: &Arc<Self>, cause: Arc<ActorError>, stop_children: bool) {
        if self.is_terminating() {
            return;
        }

        self.set_lifecycle(LifecycleState::Restarting);
        self.mailbox.suspend();

        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if let Some(actor) = state.actor.as_mut() {
                let mut ctx = ActorContext::new(self);
                if let Err(e) = actor.pre_restart(&mut ctx, &cause, state.current_message.as_ref()) {
                    error!("{}: pre_restart failed: {}", self, e);
                }
            }
            state.current_message = None;
        }

        let children = self.children();
        if stop_children && !children.is_empty() {
            debug!("{}: stopping {} children before restart", self, children.len());
            self.state.lock().pending = Some(Pending::Recreate(cause));
            for child in children {
                self.send_to(child, SystemMessage::Terminate);
            }
        } else {
            if !stop_children {
                self.tell_children(&SystemMessage::Resume);
            }
            self.finish_recreate(cause);
        }
    }

    fn finish_recreate(self: &Arc<Self>, cause: Arc<ActorError>) {
        let result = {
            let mut state = self.state.lock();
            state.pending = None;
            let fresh = state.actor.insert(self.props.recipe().create());
            fresh.post_restart(&mut ActorContext::new(self), &cause)
        };

        self.set_lifecycle(LifecycleState::Started);
        match result {
            Ok(()) => {
                debug!("{}: restarted after: {}", self, cause);
                self.mailbox.resume();
            }
            Err(e) => {
                error!("{}: post_restart failed: {}", self, e);
                self.fail(Arc::new(ActorError::Initialization(e.to_string())));
            }
        }
    }

    fn terminate(self: &Arc<Self>) {
        if self.terminating.swap(true, Ordering::AcqRel) {
            return;
        }

        self.mailbox.suspend();
        let children = self.children();
        if children.is_empty() {
            self.finish_terminate();
            return;
        }

        debug!("{}: stopping {} children", self, children.len());
        self.state.lock().pending = Some(Pending::Terminate);
        for child in children {
            self.send_to(child, SystemMessage::Terminate);
        }
    }

    fn finish_terminate(self: &Arc<Self>) {
        if self.lifecycle() == LifecycleState::Terminated {
            return;
        }
        self.terminating.store(true, Ordering::Release);

        {
            let mut state = self.state.lock();
            state.pending = None;
            state.current_message = None;
            state.child_restarts.clear();
            if let Some(mut actor) = state.actor.take() {
                let mut ctx = ActorContext::new(self);
                match panic::catch_unwind(AssertUnwindSafe(|| actor.post_stop(&mut ctx))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!("{}: post_stop failed: {}", self, e),
                    Err(payload) => error!(
                        "{}: post_stop panicked: {}",
                        self,
                        ActorError::from_panic(payload)
                    ),
                }
            }
        }

        self.set_lifecycle(LifecycleState::Terminated);
        let leftovers = self.mailbox.close();
        let system = self.system();

        if let Some(system) = &system {
            for envelope in leftovers {
                system.dead_letter(self.id, envelope);
            }

            let watching: Vec<ActorId> = self.watching.lock().drain().collect();
            for target in watching {
                system.send_system(target, SystemMessage::Unwatch { watcher: self.id });
            }

            let watchers: Vec<ActorId> = self.watchers.lock().drain().collect();
            for watcher in watchers {
                system.send_system(
                    watcher,
                    SystemMessage::DeathWatchNotification { actor: self.id },
                );
            }

            if let Some(parent) = self.parent {
                system.send_system(parent, SystemMessage::ChildTerminated { child: self.id });
            }
            system.unregister(self.id);
        }

        for listener in self.termination_listeners.lock().drain(..) {
            let _ = listener.send(self.id);
        }

        self.mailbox.dispatcher().detach();
        debug!("{}: terminated", self);
    }

    fn child_terminated(self: &Arc<Self>, child: ActorId) {
        let remaining = {
            let mut children = self.children.lock();
            children.retain(|c| *c != child);
            children.len()
        };

        let pending = {
            let mut state = self.state.lock();
            state.child_restarts.remove(&child);
            if remaining == 0 {
                state.pending.take()
            } else {
                None
            }
        };

        match pending {
            Some(Pending::Create) => self.finish_create(),
            Some(Pending::Terminate) => self.finish_terminate(),
            Some(Pending::Recreate(cause)) => self.finish_recreate(cause),
            None => {}
        }
    }

    fn child_failed(self: &Arc<Self>, child: ActorId, cause: Arc<ActorError>) {
        if self.is_terminating() {
            debug!("{}: ignoring failure of {} while terminating", self, child);
            return;
        }

        let children = self.children();
        if !children.contains(&child) {
            debug!("{}: ignoring failure of former child {}", self, child);
            return;
        }

        let strategy = self.props.supervisor_strategy();
        let effect = {
            let mut state = self.state.lock();
            supervision::supervise(
                strategy,
                &self.to_string(),
                child,
                &children,
                &mut state.child_restarts,
                &cause,
            )
        };

        match effect {
            Effect::Send(messages) => {
                for (target, message) in messages {
                    self.send_to(target, message);
                }
            }
            Effect::Escalate => {
                debug!("{}: escalating failure of {}", self, child);
                self.fail(cause);
            }
        }
    }

    fn add_watcher(&self, watcher: ActorId) {
        if watcher != self.id {
            self.watchers.lock().insert(watcher);
        }
    }

    fn watched_terminated(&self, actor: ActorId) {
        if self.watching.lock().contains(&actor) {
            self.post(Envelope::new(Terminated { actor }, None));
        }
    }
}

impl MessageInvoker for ActorCell {
    fn invoke_system_message(self: Arc<Self>, message: SystemMessage) -> Result<(), ActorError> {
        if self.lifecycle() == LifecycleState::Terminated {
            match self.system() {
                Some(system) => system.undeliverable(self.id, message),
                None => trace!("{}: dropping {:?}", self, message),
            }
            return Ok(());
        }

        match message {
            SystemMessage::Create => self.create(),
            SystemMessage::Recreate {
                cause,
                stop_children,
            } => self.recreate(cause, stop_children),
            SystemMessage::Suspend => self.suspend(),
            SystemMessage::Resume => self.resume(),
            SystemMessage::Terminate => self.terminate(),
            SystemMessage::Failed { child, cause } => self.child_failed(child, cause),
            SystemMessage::Watch { watcher } => self.add_watcher(watcher),
            SystemMessage::Unwatch { watcher } => {
                self.watchers.lock().remove(&watcher);
            }
            SystemMessage::DeathWatchNotification { actor } => self.watched_terminated(actor),
            SystemMessage::ChildTerminated { child } => self.child_terminated(child),
        }
        Ok(())
    }

    fn invoke_user_message(self: Arc<Self>, envelope: Envelope) -> Result<(), ActorError> {
        if envelope.is::<PoisonPill>() {
            debug!("{}: received PoisonPill", self);
            self.send_system(SystemMessage::Terminate);
            return Ok(());
        }

        if let Some(Terminated { actor }) = envelope.downcast_ref::<Terminated>() {
            if !self.watching.lock().remove(actor) {
                trace!("{}: dropping Terminated for unwatched {}", self, actor);
                return Ok(());
            }
        }

        let mut guard = self.state.lock();
        if guard.actor.is_none() {
            drop(guard);
            Arc::clone(&self).dead_letter(envelope);
            return Ok(());
        }

        let state = &mut *guard;
        let Some(actor) = state.actor.as_mut() else {
            return Ok(());
        };
        let envelope = state.current_message.insert(envelope);
        if envelope.is::<Kill>() {
            return Err(ActorError::Killed);
        }

        actor.receive(&mut ActorContext::new(&self), envelope)?;
        state.current_message = None;
        Ok(())
    }

    fn handle_failure(self: Arc<Self>, cause: ActorError) {
        error!("{}: failed: {}", self, cause);
        self.fail(Arc::new(cause));
    }

    fn handle_system_failure(self: Arc<Self>, cause: ActorError) {
        if self.lifecycle() == LifecycleState::Terminated {
            return;
        }
        error!("{}: stopping after fatal failure: {}", self, cause);
        self.terminating.store(true, Ordering::Release);
        self.tell_children(&SystemMessage::Terminate);
        self.finish_terminate();
    }

    fn dead_letter(self: Arc<Self>, envelope: Envelope) {
        match self.system() {
            Some(system) => system.dead_letter(self.id, envelope),
            None => trace!("{}: dropping {:?}", self, envelope),
        }
    }
}

impl fmt::Display for ActorCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id.short())
    }
}
