//! Handler discovery.
//!
//! Handlers are registered explicitly rather than found by scanning types:
//! - Statically, with `register_handler!`, collected at link time
//! - Per call, with `DiscoveryOptions::register`
//!
//! `discover_handlers` filters the registrations by module and predicate.
//! `AutoRegistrationService` instantiates and subscribes them.
//!
//! # Example
//!
//! ```ignore
//! #[derive(Default)]
//! struct WelcomeMailer;
//!
//! #[async_trait]
//! impl MessageHandler<UserCreatedEvent> for WelcomeMailer { /* ... */ }
//!
//! switchyard::register_handler!(WelcomeMailer => UserCreatedEvent);
//! ```

mod auto_register;
mod resolver;

pub use auto_register::AutoRegistrationService;
pub use resolver::HandlerResolver;

use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::broker::BrokerError;
use crate::interfaces::{
    EnvelopeHandler, MessageHandler, SubscriptionBinding, SubscriptionOptions, TypedHandler,
};
use crate::message::{Message, MessageKind};

/// Errors raised while turning registrations into live subscriptions.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Cannot instantiate handler {handler}: {reason}")]
    Instantiation { handler: String, reason: String },

    #[error("Failed to subscribe handler {handler}: {source}")]
    Subscribe {
        handler: String,
        #[source]
        source: BrokerError,
    },
}

type AnyInstance = Arc<dyn Any + Send + Sync>;

/// One (handler type, message type) pair.
#[derive(Clone, Copy)]
pub struct HandlerRegistration {
    module: &'static str,
    kind: MessageKind,
    handler_type: fn() -> &'static str,
    handler_type_id: fn() -> TypeId,
    message_type: fn() -> &'static str,
    construct: Option<fn() -> AnyInstance>,
    bind: fn(AnyInstance) -> Option<Arc<dyn EnvelopeHandler>>,
}

inventory::collect!(HandlerRegistration);

impl HandlerRegistration {
    /// Registration for a handler with a default constructor.
    pub const fn new<H, M>(module: &'static str) -> Self
    where
        H: MessageHandler<M> + Default + 'static,
        M: Message,
    {
        Self {
            construct: Some(construct_default::<H> as fn() -> AnyInstance),
            ..Self::resolved::<H, M>(module)
        }
    }

    /// Registration for a handler that must come from a `HandlerResolver`.
    pub const fn resolved<H, M>(module: &'static str) -> Self
    where
        H: MessageHandler<M> + 'static,
        M: Message,
    {
        Self {
            module,
            kind: M::KIND,
            handler_type: std::any::type_name::<H>,
            handler_type_id: TypeId::of::<H>,
            message_type: M::message_type,
            construct: None,
            bind: bind_typed::<H, M>,
        }
    }

    /// Module the registration was declared in.
    pub fn module(&self) -> &'static str {
        self.module
    }

    pub fn handler_type(&self) -> &'static str {
        (self.handler_type)()
    }

    pub fn handler_type_id(&self) -> TypeId {
        (self.handler_type_id)()
    }

    pub fn message_type(&self) -> &'static str {
        (self.message_type)()
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn is_event_handler(&self) -> bool {
        self.kind == MessageKind::Event
    }

    pub fn is_command_handler(&self) -> bool {
        self.kind == MessageKind::Command
    }

    pub fn is_message_handler(&self) -> bool {
        self.kind == MessageKind::Message
    }

    pub fn has_default_constructor(&self) -> bool {
        self.construct.is_some()
    }

    /// Binding to the message type's default topic.
    pub fn binding(&self) -> SubscriptionBinding {
        SubscriptionBinding {
            topic: self.message_type().to_string(),
            message_type: self.message_type().to_string(),
            kind: self.kind,
        }
    }

    /// Produce a handler: the resolver's instance if it has one, else the
    /// default constructor.
    pub fn instantiate(
        &self,
        resolver: &HandlerResolver,
    ) -> Result<Arc<dyn EnvelopeHandler>, DiscoveryError> {
        let instance = match resolver.get(self.handler_type_id()) {
            Some(instance) => instance,
            None => match self.construct {
                Some(construct) => construct(),
                None => {
                    return Err(self.instantiation_error(
                        "not registered in the resolver and has no default constructor",
                    ))
                }
            },
        };

        (self.bind)(instance)
            .ok_or_else(|| self.instantiation_error("resolved instance has an unexpected type"))
    }

    fn instantiation_error(&self, reason: &str) -> DiscoveryError {
        DiscoveryError::Instantiation {
            handler: self.handler_type().to_string(),
            reason: reason.to_string(),
        }
    }

    fn key(&self) -> (TypeId, &'static str) {
        (self.handler_type_id(), self.message_type())
    }
}

impl fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("module", &self.module)
            .field("handler_type", &self.handler_type())
            .field("message_type", &self.message_type())
            .field("kind", &self.kind)
            .field("default_constructor", &self.has_default_constructor())
            .finish()
    }
}

fn construct_default<H: Default + Send + Sync + 'static>() -> AnyInstance {
    Arc::new(H::default())
}

fn bind_typed<H, M>(instance: AnyInstance) -> Option<Arc<dyn EnvelopeHandler>>
where
    H: MessageHandler<M> + 'static,
    M: Message,
{
    let handler = instance.downcast::<H>().ok()?;
    Some(TypedHandler::<M, H>::new(handler).into_dyn())
}

/// Register a handler with the static collection.
///
/// `register_handler!(Handler => Message)` requires `Handler: Default`.
/// `register_handler!(resolved Handler => Message)` expects an instance in
/// the `HandlerResolver` at startup.
#[macro_export]
macro_rules! register_handler {
    (resolved $handler:ty => $message:ty) => {
        $crate::inventory::submit! {
            $crate::discovery::HandlerRegistration::resolved::<$handler, $message>(module_path!())
        }
    };
    ($handler:ty => $message:ty) => {
        $crate::inventory::submit! {
            $crate::discovery::HandlerRegistration::new::<$handler, $message>(module_path!())
        }
    };
}

/// Predicate applied to every candidate registration.
pub type RegistrationFilter = Arc<dyn Fn(&HandlerRegistration) -> bool + Send + Sync>;

/// What `discover_handlers` returns and how the auto-registration service
/// subscribes it.
#[derive(Clone)]
pub struct DiscoveryOptions {
    /// Module path prefixes to include. Empty includes every module.
    pub modules: Vec<String>,
    pub filter: Option<RegistrationFilter>,
    /// Options applied to every subscription created.
    pub subscription: SubscriptionOptions,
    /// Skip registrations that fail instead of aborting startup.
    pub continue_on_error: bool,
    registrations: Vec<HandlerRegistration>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            modules: Vec::new(),
            filter: None,
            subscription: SubscriptionOptions::default(),
            continue_on_error: true,
            registrations: Vec::new(),
        }
    }
}

impl fmt::Debug for DiscoveryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryOptions")
            .field("modules", &self.modules)
            .field("filter", &self.filter.is_some())
            .field("subscription", &self.subscription)
            .field("continue_on_error", &self.continue_on_error)
            .field("registrations", &self.registrations)
            .finish()
    }
}

impl DiscoveryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Include registrations declared in `module` or its submodules.
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.modules.push(module.into());
        self
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&HandlerRegistration) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn with_subscription_options(mut self, options: SubscriptionOptions) -> Self {
        self.subscription = options;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Add an explicit registration for a handler with a default
    /// constructor. Explicit registrations bypass the module list.
    pub fn register<H, M>(self) -> Self
    where
        H: MessageHandler<M> + Default + 'static,
        M: Message,
    {
        self.with_registration(HandlerRegistration::new::<H, M>(module_of::<H>()))
    }

    /// Add an explicit registration resolved through `HandlerResolver`.
    pub fn register_resolved<H, M>(self) -> Self
    where
        H: MessageHandler<M> + 'static,
        M: Message,
    {
        self.with_registration(HandlerRegistration::resolved::<H, M>(module_of::<H>()))
    }

    pub fn with_registration(mut self, registration: HandlerRegistration) -> Self {
        self.registrations.push(registration);
        self
    }

    fn includes_module(&self, module: &str) -> bool {
        self.modules.is_empty()
            || self.modules.iter().any(|prefix| {
                module == prefix
                    || module
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with("::"))
            })
    }

    fn accepts(&self, registration: &HandlerRegistration) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(registration))
    }
}

/// Module path of `H`, from its type name.
fn module_of<H>() -> &'static str {
    let name = std::any::type_name::<H>();
    let path = name.split('<').next().unwrap_or(name);
    path.rsplit_once("::").map_or("", |(module, _)| module)
}

/// Registrations matching `options`, without duplicates, ordered by module
/// then handler type.
pub fn discover_handlers(options: &DiscoveryOptions) -> Vec<HandlerRegistration> {
    let statics = inventory::iter::<HandlerRegistration>
        .into_iter()
        .filter(|registration| options.includes_module(registration.module()))
        .copied();

    let mut seen = HashSet::new();
    let mut found: Vec<HandlerRegistration> = statics
        .chain(options.registrations.iter().copied())
        .filter(|registration| options.accepts(registration))
        .filter(|registration| seen.insert(registration.key()))
        .collect();

    found.sort_by(|a, b| {
        (a.module(), a.handler_type(), a.message_type())
            .cmp(&(b.module(), b.handler_type(), b.message_type()))
    });
    found
}
