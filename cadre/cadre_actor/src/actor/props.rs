use std::any;
use std::fmt;
use std::sync::Arc;

use super::Actor;
use crate::supervision::SupervisorStrategy;

/// Captured constructor arguments plus the constructor.
///
/// A recipe is invoked for the first instance and again on every restart,
/// so each restart starts from the same arguments.
#[derive(Clone)]
pub struct Recipe {
    produce: Arc<dyn Fn() -> Box<dyn Actor> + Send + Sync>,
    type_name: &'static str,
}

impl Recipe {
    /// A recipe from a no-argument constructor.
    pub fn new<A, F>(constructor: F) -> Self
    where
        A: Actor,
        F: Fn() -> A + Send + Sync + 'static,
    {
        Self {
            produce: Arc::new(move || Box::new(constructor()) as Box<dyn Actor>),
            type_name: any::type_name::<A>(),
        }
    }

    /// A recipe that hands `args` to `constructor` for every instance.
    pub fn with_args<A, T, F>(args: T, constructor: F) -> Self
    where
        A: Actor,
        T: Send + Sync + 'static,
        F: Fn(&T) -> A + Send + Sync + 'static,
    {
        Self {
            produce: Arc::new(move || Box::new(constructor(&args)) as Box<dyn Actor>),
            type_name: any::type_name::<A>(),
        }
    }

    /// Build an instance.
    pub fn create(&self) -> Box<dyn Actor> {
        (self.produce)()
    }

    /// Name of the actor type this recipe builds.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recipe")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Everything needed to spawn an actor.
#[derive(Clone, Debug)]
pub struct Props {
    recipe: Recipe,
    dispatcher: Option<String>,
    mailbox: Option<String>,
    supervisor_strategy: SupervisorStrategy,
}

impl Props {
    /// Props for `recipe` on the default dispatcher and mailbox, supervising
    /// children with the default strategy.
    pub fn new(recipe: Recipe) -> Self {
        Self {
            recipe,
            dispatcher: None,
            mailbox: None,
            supervisor_strategy: SupervisorStrategy::default(),
        }
    }

    /// Shorthand for `Props::new(Recipe::new(constructor))`.
    pub fn from_fn<A, F>(constructor: F) -> Self
    where
        A: Actor,
        F: Fn() -> A + Send + Sync + 'static,
    {
        Self::new(Recipe::new(constructor))
    }

    /// Run on the dispatcher configured under `id`.
    pub fn with_dispatcher(mut self, id: impl Into<String>) -> Self {
        self.dispatcher = Some(id.into());
        self
    }

    /// Use the mailbox configured under `id`.
    pub fn with_mailbox(mut self, id: impl Into<String>) -> Self {
        self.mailbox = Some(id.into());
        self
    }

    /// The strategy this actor applies to its own children.
    pub fn with_supervisor_strategy(mut self, strategy: SupervisorStrategy) -> Self {
        self.supervisor_strategy = strategy;
        self
    }

    /// The recipe.
    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    /// Dispatcher id, if not the default.
    pub fn dispatcher(&self) -> Option<&str> {
        self.dispatcher.as_deref()
    }

    /// Mailbox id, if not the default.
    pub fn mailbox(&self) -> Option<&str> {
        self.mailbox.as_deref()
    }

    /// Strategy for this actor's children.
    pub fn supervisor_strategy(&self) -> &SupervisorStrategy {
        &self.supervisor_strategy
    }
}
