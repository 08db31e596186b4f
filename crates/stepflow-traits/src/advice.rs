//! Before/after hooks attached to a channel.

use std::any::Any;

use async_trait::async_trait;

use stepflow_model::{Exchange, Result};

/// Opaque per-invocation value handed from `before` to the paired `after`.
pub type AdviceToken = Option<Box<dyn Any + Send>>;

/// Order key for advices that must wrap outermost of all.
pub const ORDER_OUTERMOST: i32 = -200;
/// Order key placing an advice outside the rest of the chain but inside
/// [`ORDER_OUTERMOST`] ones.
pub const ORDER_STREAM_CACHING: i32 = -100;
/// Default order key; ties keep registration order.
pub const ORDER_DEFAULT: i32 = 0;

/// A before/after hook around one node traversal.
///
/// `before` runs on the way in, `after` on the way out, nested stack-like
/// with the other advices on the channel. An advice must not keep
/// per-exchange state anywhere except the token it returns: the same
/// advice instance serves every exchange crossing the node.
///
/// `after` is never skipped for an advice whose `before` completed, even
/// when a later advice stopped routing or the target failed.
#[async_trait]
pub trait Advice: Send + Sync {
    /// Name used in logs when an `after` failure is swallowed.
    fn name(&self) -> &str;

    /// Sort key deciding how far out this advice wraps. Lower keys wrap
    /// further out; equal keys keep their registration order.
    fn order(&self) -> i32 {
        ORDER_DEFAULT
    }

    async fn before(&self, exchange: &mut Exchange) -> Result<AdviceToken>;

    async fn after(&self, exchange: &mut Exchange, token: AdviceToken) -> Result<()>;
}
