//! The simulation kernel.
//!
//! A `Context` keeps simulated time, a queue of timed plans, a FIFO queue of
//! callbacks that run before the next plan, typed events, and a map of data
//! plugins. Every simulation module stores its state in a data plugin and
//! exposes behavior through a `ContextXxxExt` extension trait.
use std::any::{Any, TypeId};
use std::collections::VecDeque;
use std::rc::Rc;

use log::trace;

use crate::plan::{PlanId, Queue};
use crate::HashMap;

/// A type that owns one piece of module state stored in a `Context`.
pub trait DataPlugin: Any {
    type DataContainer: Any;

    fn create_data_container() -> Self::DataContainer;
}

/// Defines a data plugin with the given container type and initializer.
#[macro_export]
macro_rules! define_data_plugin {
    ($plugin:ident, $data_container:ty, $default:expr) => {
        struct $plugin;

        impl $crate::context::DataPlugin for $plugin {
            type DataContainer = $data_container;

            fn create_data_container() -> Self::DataContainer {
                $default
            }
        }
    };
}
pub use define_data_plugin;

/// Events are cloned once per subscriber, so payloads should be small.
pub trait SimulationEvent: Clone + 'static {}

/// Plans scheduled for the same time run in phase order. Within a phase they
/// run in the order they were added.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExecutionPhase {
    First,
    Normal,
    Last,
}

type Callback = dyn FnOnce(&mut Context);
type EventHandler<E> = dyn Fn(&mut Context, E);

pub struct Context {
    plan_queue: Queue<Box<Callback>, ExecutionPhase>,
    callback_queue: VecDeque<Box<Callback>>,
    event_handlers: HashMap<TypeId, Box<dyn Any>>,
    data_plugins: HashMap<TypeId, Box<dyn Any>>,
    current_time: f64,
    shutdown_requested: bool,
}

impl Context {
    #[must_use]
    pub fn new() -> Context {
        Context {
            plan_queue: Queue::new(),
            callback_queue: VecDeque::new(),
            event_handlers: HashMap::default(),
            data_plugins: HashMap::default(),
            current_time: 0.0,
            shutdown_requested: false,
        }
    }

    /// Add a plan to run at `time` in the `Normal` phase.
    ///
    /// # Panics
    ///
    /// Panics if `time` is NaN, infinite, or earlier than the current time.
    pub fn add_plan(&mut self, time: f64, callback: impl FnOnce(&mut Context) + 'static) -> PlanId {
        self.add_plan_with_phase(time, callback, ExecutionPhase::Normal)
    }

    /// # Panics
    ///
    /// Panics if `time` is NaN, infinite, or earlier than the current time.
    pub fn add_plan_with_phase(
        &mut self,
        time: f64,
        callback: impl FnOnce(&mut Context) + 'static,
        phase: ExecutionPhase,
    ) -> PlanId {
        assert!(
            !time.is_nan() && !time.is_infinite() && time >= self.current_time,
            "Time is invalid"
        );
        self.plan_queue.add_plan(time, Box::new(callback), phase)
    }

    /// Run `callback` now and then every `period` for as long as other plans
    /// remain in the queue.
    ///
    /// # Panics
    ///
    /// Panics if `period` is not a positive finite number.
    pub fn add_periodic_plan_with_phase(
        &mut self,
        period: f64,
        callback: impl Fn(&mut Context) + 'static,
        phase: ExecutionPhase,
    ) {
        assert!(
            period > 0.0 && !period.is_nan() && !period.is_infinite(),
            "Period must be greater than 0"
        );
        let callback: Rc<dyn Fn(&mut Context)> = Rc::new(callback);
        let start = self.current_time;
        self.add_plan_with_phase(
            start,
            move |context| context.evaluate_periodic_and_schedule_next(period, callback, phase),
            phase,
        );
    }

    fn evaluate_periodic_and_schedule_next(
        &mut self,
        period: f64,
        callback: Rc<dyn Fn(&mut Context)>,
        phase: ExecutionPhase,
    ) {
        trace!("evaluate periodic at {}", self.current_time);
        callback(self);
        if !self.plan_queue.is_empty() {
            let next_time = self.current_time + period;
            self.add_plan_with_phase(
                next_time,
                move |context| context.evaluate_periodic_and_schedule_next(period, callback, phase),
                phase,
            );
        }
    }

    /// # Panics
    ///
    /// Panics if the plan has already run or been cancelled.
    pub fn cancel_plan(&mut self, id: &PlanId) {
        self.plan_queue.cancel_plan(id);
    }

    pub fn queue_callback(&mut self, callback: impl FnOnce(&mut Context) + 'static) {
        self.callback_queue.push_back(Box::new(callback));
    }

    /// Register a handler that runs, as a queued callback, each time an event
    /// of type `E` is emitted.
    pub fn subscribe_to_event<E: SimulationEvent>(
        &mut self,
        handler: impl Fn(&mut Context, E) + 'static,
    ) {
        let handlers = self
            .event_handlers
            .entry(TypeId::of::<E>())
            .or_insert_with(|| -> Box<dyn Any> { Box::new(Vec::<Rc<EventHandler<E>>>::new()) });
        if let Some(handlers) = handlers.downcast_mut::<Vec<Rc<EventHandler<E>>>>() {
            handlers.push(Rc::new(handler));
        }
    }

    /// Queue every subscribed handler for `event`. Handlers run after the
    /// current plan or callback returns.
    pub fn emit_event<E: SimulationEvent>(&mut self, event: E) {
        let Context {
            event_handlers,
            callback_queue,
            ..
        } = self;
        let Some(handlers) = event_handlers
            .get(&TypeId::of::<E>())
            .and_then(|handlers| handlers.downcast_ref::<Vec<Rc<EventHandler<E>>>>())
        else {
            return;
        };
        for handler in handlers {
            let handler = Rc::clone(handler);
            let event = event.clone();
            callback_queue.push_back(Box::new(move |context| handler(context, event)));
        }
    }

    /// Returns the container for plugin `T`, creating it on first access.
    ///
    /// # Panics
    ///
    /// Panics only if two plugins share a `TypeId`, which cannot happen.
    pub fn get_data_container_mut<T: DataPlugin>(&mut self, _plugin: T) -> &mut T::DataContainer {
        self.data_plugins
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::create_data_container()))
            .downcast_mut::<T::DataContainer>()
            .expect("data plugin container has the wrong type")
    }

    /// Returns the container for plugin `T` if it has been created.
    #[must_use]
    pub fn get_data_container<T: DataPlugin>(&self, _plugin: T) -> Option<&T::DataContainer> {
        self.data_plugins
            .get(&TypeId::of::<T>())
            .and_then(|container| container.downcast_ref::<T::DataContainer>())
    }

    #[must_use]
    pub fn get_current_time(&self) -> f64 {
        self.current_time
    }

    /// Stop `execute` once the running plan or callback returns. Pending plans
    /// and callbacks are discarded.
    pub fn shutdown(&mut self) {
        trace!("shutdown requested at {}", self.current_time);
        self.shutdown_requested = true;
    }

    pub fn execute(&mut self) {
        trace!("entering event loop");
        loop {
            if self.shutdown_requested {
                self.plan_queue.clear();
                self.callback_queue.clear();
                break;
            }

            if let Some(callback) = self.callback_queue.pop_front() {
                callback(self);
                continue;
            }

            match self.plan_queue.get_next_plan() {
                Some(plan) => {
                    self.current_time = plan.time;
                    (plan.data)(self);
                }
                None => break,
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    define_data_plugin!(ComponentA, Vec<u32>, vec![]);

    fn add_plan(context: &mut Context, time: f64, value: u32) -> PlanId {
        context.add_plan(time, move |context| {
            context.get_data_container_mut(ComponentA).push(value);
        })
    }

    fn recorded(context: &Context) -> Vec<u32> {
        context
            .get_data_container(ComponentA)
            .cloned()
            .unwrap_or_default()
    }

    #[derive(Clone, Copy)]
    struct Ping(u32);
    impl SimulationEvent for Ping {}

    #[test]
    #[should_panic(expected = "Time is invalid")]
    fn negative_plan_time() {
        let mut context = Context::new();
        add_plan(&mut context, -1.0, 0);
    }

    #[test]
    #[should_panic(expected = "Time is invalid")]
    fn nan_plan_time() {
        let mut context = Context::new();
        add_plan(&mut context, f64::NAN, 0);
    }

    #[test]
    fn empty_context() {
        let mut context = Context::new();
        context.execute();
        assert_eq!(context.get_current_time(), 0.0);
        assert!(context.get_data_container(ComponentA).is_none());
    }

    #[test]
    fn callback_before_timed_plan() {
        let mut context = Context::new();
        context.queue_callback(|context| {
            context.get_data_container_mut(ComponentA).push(1);
        });
        add_plan(&mut context, 1.0, 2);
        context.execute();
        assert_eq!(context.get_current_time(), 1.0);
        assert_eq!(recorded(&context), vec![1, 2]);
    }

    #[test]
    fn timed_plan_adds_callback_and_timed_plan() {
        let mut context = Context::new();
        context.add_plan(1.0, |context| {
            context.get_data_container_mut(ComponentA).push(1);
            // The callback is queued after the plan but still fires first.
            add_plan(context, 2.0, 3);
            context.queue_callback(|context| {
                context.get_data_container_mut(ComponentA).push(2);
            });
        });
        context.execute();
        assert_eq!(context.get_current_time(), 2.0);
        assert_eq!(recorded(&context), vec![1, 2, 3]);
    }

    #[test]
    fn cancel_plan() {
        let mut context = Context::new();
        let to_cancel = add_plan(&mut context, 2.0, 1);
        context.add_plan(1.0, move |context| {
            context.cancel_plan(&to_cancel);
        });
        context.execute();
        assert_eq!(context.get_current_time(), 1.0);
        assert_eq!(recorded(&context), Vec::<u32>::new());
    }

    #[test]
    fn phases_order_plans_at_the_same_time() {
        let mut context = Context::new();
        context.add_plan_with_phase(
            1.0,
            |context| context.get_data_container_mut(ComponentA).push(3),
            ExecutionPhase::Last,
        );
        add_plan(&mut context, 1.0, 2);
        context.add_plan_with_phase(
            1.0,
            |context| context.get_data_container_mut(ComponentA).push(1),
            ExecutionPhase::First,
        );
        context.execute();
        assert_eq!(recorded(&context), vec![1, 2, 3]);
    }

    #[test]
    fn periodic_plan_runs_until_queue_is_empty() {
        let mut context = Context::new();
        context.add_periodic_plan_with_phase(
            1.0,
            |context| {
                let time = context.get_current_time() as u32;
                context.get_data_container_mut(ComponentA).push(time);
            },
            ExecutionPhase::Normal,
        );
        context.add_plan_with_phase(3.0, |_| {}, ExecutionPhase::First);
        context.execute();
        assert_eq!(recorded(&context), vec![0, 1, 2, 3]);
    }

    #[test]
    fn shutdown_discards_pending_plans() {
        let mut context = Context::new();
        add_plan(&mut context, 1.0, 1);
        context.add_plan(2.0, Context::shutdown);
        add_plan(&mut context, 3.0, 3);
        context.execute();
        assert_eq!(context.get_current_time(), 2.0);
        assert_eq!(recorded(&context), vec![1]);
    }

    #[test]
    fn events_reach_every_subscriber() {
        let mut context = Context::new();
        context.subscribe_to_event(|context, event: Ping| {
            context.get_data_container_mut(ComponentA).push(event.0);
        });
        context.subscribe_to_event(|context, event: Ping| {
            context.get_data_container_mut(ComponentA).push(event.0 * 10);
        });
        context.add_plan(1.0, |context| context.emit_event(Ping(4)));
        context.execute();
        assert_eq!(recorded(&context), vec![4, 40]);
    }

    #[test]
    fn emit_without_subscribers_is_a_no_op() {
        let mut context = Context::new();
        context.emit_event(Ping(1));
        context.execute();
        assert!(context.get_data_container(ComponentA).is_none());
    }
}
