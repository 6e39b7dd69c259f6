use crate::{Clock, FlakeId, Result, Snowflake, WorkerIdentity};

/// Trait for generating ids.
///
/// Lets request handlers hold any generator behind `Arc<dyn IdGenerator>`
/// without caring about the clock it runs on.
pub trait IdGenerator: Send + Sync + 'static {
    /// Generates the next id. Failures affect only this call.
    fn next_id(&self) -> Result<FlakeId>;

    /// The identity stamped into every generated id.
    fn identity(&self) -> WorkerIdentity;
}

impl<C: Clock + 'static> IdGenerator for Snowflake<C> {
    fn next_id(&self) -> Result<FlakeId> {
        Snowflake::next_id(self)
    }

    fn identity(&self) -> WorkerIdentity {
        Snowflake::identity(self)
    }
}
