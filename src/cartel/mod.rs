//! Cartel client interface consumed by the container-host reconciler.
//!
//! Cartel is the remote lifecycle API for container hosts. The reconciler
//! only ever talks to it through [`CartelClient`], so tests can inject an
//! in-memory double and the binary can wire [`HttpCartelClient`].

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

mod error;
mod http;
mod types;

pub use error::CartelError;
pub use http::HttpCartelClient;
pub use types::{CreateAck, CreateRequest, DeploymentState, Instance};

/// Future returned by Cartel operations.
pub type CartelFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CartelError>> + Send + 'a>>;

/// Host operations offered by the Cartel API.
///
/// Every failure is a [`CartelError`] whose [`CartelError::status`] exposes
/// the HTTP-like status so callers can tell a missing host from a server
/// fault or an unreachable endpoint.
pub trait CartelClient: Send + Sync {
    /// Requests a new host.
    fn create<'a>(&'a self, request: &'a CreateRequest) -> CartelFuture<'a, CreateAck>;

    /// Destroys the host registered under `name`.
    fn destroy<'a>(&'a self, name: &'a str) -> CartelFuture<'a, ()>;

    /// Fetches the current details of the host named `name`.
    fn get_details<'a>(&'a self, name: &'a str) -> CartelFuture<'a, Instance>;

    /// Fetches the provisioning workflow state of the host named `name`.
    fn get_deployment_state<'a>(&'a self, name: &'a str) -> CartelFuture<'a, DeploymentState>;

    /// Lists every host visible to the caller.
    fn get_all_instances(&self) -> CartelFuture<'_, Vec<Instance>>;

    /// Sets tags on the named hosts. An empty value removes the tag.
    fn add_tags<'a>(
        &'a self,
        names: &'a [String],
        tags: &'a BTreeMap<String, String>,
    ) -> CartelFuture<'a, ()>;

    /// Grants the listed LDAP user groups access to the host.
    fn add_user_groups<'a>(&'a self, name: &'a str, groups: &'a [String]) -> CartelFuture<'a, ()>;

    /// Revokes the listed LDAP user groups from the host.
    fn remove_user_groups<'a>(
        &'a self,
        name: &'a str,
        groups: &'a [String],
    ) -> CartelFuture<'a, ()>;

    /// Attaches the listed security groups to the host.
    fn add_security_groups<'a>(
        &'a self,
        name: &'a str,
        groups: &'a [String],
    ) -> CartelFuture<'a, ()>;

    /// Detaches the listed security groups from the host.
    fn remove_security_groups<'a>(
        &'a self,
        name: &'a str,
        groups: &'a [String],
    ) -> CartelFuture<'a, ()>;

    /// Enables or disables termination protection.
    fn set_protection<'a>(&'a self, name: &'a str, protect: bool) -> CartelFuture<'a, ()>;

    /// Returns the bastion host used to reach hosts over SSH.
    fn bastion_host(&self) -> String;
}

#[cfg(test)]
mod tests;
