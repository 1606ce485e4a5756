mod deadline;
mod internal;
mod metrics;

pub(crate) use self::{
    deadline::{Deadline, RequestDeadline},
    internal::Internal,
    metrics::Metrics,
};
