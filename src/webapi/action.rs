//! Controller methods and their result shapes.
//!
//! A controller method is wrapped in [`SyncAction`] or [`AsyncAction`] when
//! it is registered. Together with the [`ActionValue`] implementation of its
//! return type this fixes the method's [`ResultKind`] at compile time, so
//! the dispatch path never inspects types at request time.

use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use crate::error::HandlerError;

/// Closed set of result shapes a controller method may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// `bool`: the method decides whether the request was handled.
    Bool,
    AsyncBool,
    /// Any serializable value: serialized, then handled.
    Object,
    AsyncObject,
    /// `()`: handled once the method returns.
    Void,
    AsyncVoid,
}

impl ResultKind {
    pub(crate) fn new(is_async: bool, value: ValueKind) -> Self {
        match (is_async, value) {
            (false, ValueKind::Bool) => ResultKind::Bool,
            (true, ValueKind::Bool) => ResultKind::AsyncBool,
            (false, ValueKind::Object) => ResultKind::Object,
            (true, ValueKind::Object) => ResultKind::AsyncObject,
            (false, ValueKind::Void) => ResultKind::Void,
            (true, ValueKind::Void) => ResultKind::AsyncVoid,
        }
    }

    pub fn is_async(self) -> bool {
        matches!(
            self,
            ResultKind::AsyncBool | ResultKind::AsyncObject | ResultKind::AsyncVoid
        )
    }
}

impl std::fmt::Display for ResultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResultKind::Bool => "bool",
            ResultKind::AsyncBool => "async bool",
            ResultKind::Object => "object",
            ResultKind::AsyncObject => "async object",
            ResultKind::Void => "void",
            ResultKind::AsyncVoid => "async void",
        };
        f.write_str(s)
    }
}

/// Shape of a return value, ignoring whether it was awaited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Object,
    Void,
}

/// What the dispatcher does with a method's return value.
#[derive(Debug)]
pub enum Outcome {
    /// Report this as the handled flag.
    Handled(bool),
    /// Pass to the response serializer, then report handled.
    Serialize(Value),
    /// Report handled.
    Completed,
}

/// A type a controller method may return.
pub trait ActionValue: Send + 'static {
    const KIND: ValueKind;

    fn into_outcome(self) -> Result<Outcome, HandlerError>;
}

impl ActionValue for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn into_outcome(self) -> Result<Outcome, HandlerError> {
        Ok(Outcome::Handled(self))
    }
}

impl ActionValue for () {
    const KIND: ValueKind = ValueKind::Void;

    fn into_outcome(self) -> Result<Outcome, HandlerError> {
        Ok(Outcome::Completed)
    }
}

impl ActionValue for String {
    const KIND: ValueKind = ValueKind::Object;

    fn into_outcome(self) -> Result<Outcome, HandlerError> {
        Ok(Outcome::Serialize(Value::String(self)))
    }
}

impl ActionValue for Value {
    const KIND: ValueKind = ValueKind::Object;

    fn into_outcome(self) -> Result<Outcome, HandlerError> {
        Ok(Outcome::Serialize(self))
    }
}

/// Wraps any `Serialize` type as an object result.
#[derive(Debug, Clone)]
pub struct Json<T>(pub T);

impl<T: Serialize + Send + 'static> ActionValue for Json<T> {
    const KIND: ValueKind = ValueKind::Object;

    fn into_outcome(self) -> Result<Outcome, HandlerError> {
        serde_json::to_value(self.0)
            .map(Outcome::Serialize)
            .map_err(HandlerError::unhandled)
    }
}

impl<T: Serialize + Send + 'static> ActionValue for Vec<T> {
    const KIND: ValueKind = ValueKind::Object;

    fn into_outcome(self) -> Result<Outcome, HandlerError> {
        Json(self).into_outcome()
    }
}

impl<T: Serialize + Send + 'static> ActionValue for Option<T> {
    const KIND: ValueKind = ValueKind::Object;

    fn into_outcome(self) -> Result<Outcome, HandlerError> {
        Json(self).into_outcome()
    }
}

/// A controller method taking `Args` and producing `T`.
pub trait Action<C, Args, T>: Send + Sync + 'static {
    /// Whether the method returns a future.
    const ASYNC: bool;

    fn invoke<'a>(&'a self, controller: &'a mut C, args: Args) -> BoxFuture<'a, Result<T, HandlerError>>;
}

/// A method that runs to completion without suspending.
///
/// `SyncAction(Greeter::say_hi)` for `fn say_hi(&mut self, name: String) -> Result<String, HandlerError>`.
pub struct SyncAction<F>(pub F);

/// A method returning a boxed future that may borrow the controller.
///
/// The method must have the shape
/// `fn load<'c>(&'c mut self, id: u64) -> BoxFuture<'c, Result<T, HandlerError>>`.
pub struct AsyncAction<F>(pub F);

macro_rules! impl_action {
    ($($A:ident $a:ident),*) => {
        impl<C, F, T, $($A),*> Action<C, ($($A,)*), T> for SyncAction<F>
        where
            C: Send + 'static,
            F: Fn(&mut C $(, $A)*) -> Result<T, HandlerError> + Send + Sync + 'static,
            T: Send + 'static,
            $($A: Send + 'static,)*
        {
            const ASYNC: bool = false;

            fn invoke<'a>(
                &'a self,
                controller: &'a mut C,
                ($($a,)*): ($($A,)*),
            ) -> BoxFuture<'a, Result<T, HandlerError>> {
                let result = (self.0)(controller $(, $a)*);
                Box::pin(std::future::ready(result))
            }
        }

        impl<C, F, T, $($A),*> Action<C, ($($A,)*), T> for AsyncAction<F>
        where
            C: Send + 'static,
            F: for<'c> Fn(&'c mut C $(, $A)*) -> BoxFuture<'c, Result<T, HandlerError>>
                + Send
                + Sync
                + 'static,
            T: Send + 'static,
            $($A: Send + 'static,)*
        {
            const ASYNC: bool = true;

            fn invoke<'a>(
                &'a self,
                controller: &'a mut C,
                ($($a,)*): ($($A,)*),
            ) -> BoxFuture<'a, Result<T, HandlerError>> {
                (self.0)(controller $(, $a)*)
            }
        }
    };
}

impl_action!();
impl_action!(A a);
impl_action!(A a, B b);
impl_action!(A a, B b, D d);
impl_action!(A a, B b, D d, E e);
impl_action!(A a, B b, D d, E e, G g);
impl_action!(A a, B b, D d, E e, G g, H h);

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        n: u32,
    }

    impl Counter {
        fn add(&mut self, by: u32) -> Result<u32, HandlerError> {
            self.n += by;
            Ok(self.n)
        }

        fn add_later<'c>(&'c mut self, by: u32) -> BoxFuture<'c, Result<u32, HandlerError>> {
            Box::pin(async move {
                tokio::task::yield_now().await;
                self.n += by;
                Ok(self.n)
            })
        }
    }

    fn is_async<A: Action<Counter, (u32,), u32>>(_action: &A) -> bool {
        A::ASYNC
    }

    #[tokio::test]
    async fn sync_and_async_actions_share_the_interface() {
        let mut counter = Counter { n: 1 };
        let sync = SyncAction(Counter::add);
        let later = AsyncAction(Counter::add_later);

        assert!(!is_async(&sync));
        assert!(is_async(&later));
        assert_eq!(sync.invoke(&mut counter, (2u32,)).await.unwrap(), 3);
        assert_eq!(later.invoke(&mut counter, (4u32,)).await.unwrap(), 7);
    }

    #[test]
    fn result_kinds_are_closed() {
        assert_eq!(ResultKind::new(false, <bool as ActionValue>::KIND), ResultKind::Bool);
        assert_eq!(ResultKind::new(true, <() as ActionValue>::KIND), ResultKind::AsyncVoid);
        assert_eq!(ResultKind::new(true, <String as ActionValue>::KIND), ResultKind::AsyncObject);
        assert!(ResultKind::AsyncBool.is_async());
    }

    #[test]
    fn values_normalize() {
        assert!(matches!(true.into_outcome().unwrap(), Outcome::Handled(true)));
        assert!(matches!(().into_outcome().unwrap(), Outcome::Completed));
        match Json(vec![1, 2]).into_outcome().unwrap() {
            Outcome::Serialize(v) => assert_eq!(v, serde_json::json!([1, 2])),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
