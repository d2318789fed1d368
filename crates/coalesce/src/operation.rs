use std::borrow::Cow;
use std::future::Future;

use anyhow::Result;
use async_trait::async_trait;

/// The work a [`Coalescer`](crate::Coalescer) runs.
///
/// `C` is the context the operation is invoked with: either bound once at
/// construction or supplied by the trigger that armed the timer.
///
/// The coalescer awaits the returned future to completion before deciding
/// whether a follow-up run is owed, so asynchronous work inside `run` never
/// overlaps with the next run. An `Err` (or a panic) is reported as a fault;
/// it is never retried.
///
/// Closures of the form `Fn(C) -> impl Future<Output = anyhow::Result<()>>`
/// implement this trait. A closure has no name of its own, so it reports the
/// function it was defined in (`main::{{closure}}`); give it a proper one
/// with [`CoalescerBuilder::name`](crate::CoalescerBuilder::name) or
/// [`CoalescerConfig::with_name`](crate::CoalescerConfig::with_name).
#[async_trait]
pub trait Operation<C: Send + 'static = ()>: Send + Sync + 'static {
    /// Run the operation once.
    async fn run(&self, ctx: C) -> Result<()>;

    /// Human-readable name used in logs, faults and `Debug` output.
    ///
    /// Defaults to the type name without its module path.
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(short_type_name(std::any::type_name::<Self>()))
    }
}

#[async_trait]
impl<C, F, Fut> Operation<C> for F
where
    C: Send + 'static,
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn run(&self, ctx: C) -> Result<()> {
        (self)(ctx).await
    }
}

const CLOSURE: &str = "::{{closure}}";

/// `my_crate::jobs::Flush<T>` -> `Flush<T>`
///
/// Closures keep their enclosing function: `my_crate::main::{{closure}}` ->
/// `main::{{closure}}`.
fn short_type_name(full: &str) -> &str {
    let mut head = full.split('<').next().unwrap_or(full);
    while let Some(outer) = head.strip_suffix(CLOSURE) {
        head = outer;
    }
    match head.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flush;

    #[async_trait]
    impl Operation for Flush {
        async fn run(&self, _ctx: ()) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn default_name_is_the_short_type_name() {
        assert_eq!(Flush.name(), "Flush");
    }

    #[test]
    fn short_type_name_keeps_generics() {
        assert_eq!(short_type_name("a::b::Flush<c::D>"), "Flush<c::D>");
        assert_eq!(short_type_name("Plain"), "Plain");
    }

    #[test]
    fn closures_are_named_after_their_enclosing_function() {
        assert_eq!(
            short_type_name("app::jobs::flush::{{closure}}"),
            "flush::{{closure}}"
        );
        assert_eq!(
            short_type_name("app::main::{{closure}}::{{closure}}"),
            "main::{{closure}}::{{closure}}"
        );

        let op = |_: ()| async { Ok::<(), anyhow::Error>(()) };
        assert_eq!(
            Operation::name(&op),
            "closures_are_named_after_their_enclosing_function::{{closure}}"
        );
    }

    #[tokio::test]
    async fn closures_are_operations() {
        let op = |n: u32| async move {
            anyhow::ensure!(n < 10, "too large: {n}");
            Ok(())
        };

        assert!(Operation::run(&op, 3).await.is_ok());
        assert!(Operation::run(&op, 30).await.is_err());
    }
}
