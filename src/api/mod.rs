//! The GraphQL glue: request context, the baseline types every schema
//! contains and the resolver envelope.

pub(crate) mod envelope;
pub(crate) mod scalars;

mod context;
mod schema;

#[cfg(test)]
mod tests;

pub(crate) use self::{
    context::Context,
    envelope::Enveloped,
    schema::Schema,
};
