//! Device-farm abstraction consumed by the provisioning workflow.
//!
//! The [`DeviceFarm`] trait covers the handful of remote calls a run needs:
//! authentication, catalog listings, the instance lifecycle, image upload and
//! console access. [`crate::avh::AvhClient`] implements it over HTTP and
//! [`crate::test_support::ScriptedFarm`] implements it in memory.

mod types;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::console::ConsoleStream;

pub use types::{InstanceId, InstanceState, ProjectId};

/// Image type used for firmware binaries.
pub const FIRMWARE_IMAGE_TYPE: &str = "fwbinary";
/// Encoding used for firmware binaries.
pub const FIRMWARE_IMAGE_ENCODING: &str = "plain";

/// API token exchanged for a session access token during login.
///
/// The value is redacted from `Debug` output so it never reaches logs.
#[derive(Clone, Eq, PartialEq)]
pub struct ApiToken(String);

impl ApiToken {
    /// Wraps a raw API token.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Exposes the secret for transmission.
    #[must_use]
    pub const fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("ApiToken(<redacted>)")
    }
}

/// Project entry from the account's project listing.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Project {
    /// Project identifier.
    pub id: ProjectId,
    /// Human readable project name.
    #[serde(default)]
    pub name: String,
}

/// Board model descriptor from the catalog.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Model {
    /// Display name of the board.
    pub name: String,
    /// Hardware profile identifier used when creating instances.
    pub flavor: String,
    /// Model identifier used to list compatible software.
    pub model: String,
    /// Optional catalog description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Base firmware descriptor paired with a model.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Software {
    /// Operating system version.
    pub version: String,
    /// Build identifier of the operating system.
    pub buildid: String,
    /// File name of the firmware image.
    #[serde(default)]
    pub filename: String,
}

/// Instance as reported by the device farm.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Instance {
    /// Remote identifier.
    pub id: InstanceId,
    /// Name supplied at creation time.
    #[serde(default)]
    pub name: String,
    /// Lifecycle state at the time of the response.
    #[serde(default)]
    pub state: InstanceState,
    /// Board flavor backing the instance.
    #[serde(default)]
    pub flavor: String,
    /// Operating system version.
    #[serde(default)]
    pub os: String,
    /// Operating system build identifier.
    #[serde(default)]
    pub osbuild: String,
}

/// Image upload record returned by the device farm.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Image {
    /// Remote identifier.
    pub id: String,
    /// Image name.
    #[serde(default)]
    pub name: String,
    /// Processing status, when reported.
    #[serde(default)]
    pub status: Option<String>,
}

/// Console access details for an instance.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConsoleEndpoint {
    /// WebSocket URL streaming the instance console.
    pub url: String,
}

/// Parameters required to create a new instance.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CreateInstanceRequest {
    /// Instance name; unique per run.
    pub name: String,
    /// Owning project.
    pub project: ProjectId,
    /// Board flavor.
    pub flavor: String,
    /// Operating system version.
    pub os: String,
    /// Operating system build identifier.
    pub osbuild: String,
}

/// Binary image uploaded to an instance.
#[derive(Clone, Eq, PartialEq)]
pub struct ImageUpload {
    /// Image type (for example `fwbinary`).
    pub kind: String,
    /// Payload encoding (for example `plain`).
    pub encoding: String,
    /// Image name shown by the device farm.
    pub name: String,
    /// Instance the image is bound to.
    pub instance: InstanceId,
    /// Raw payload.
    pub payload: Vec<u8>,
}

impl ImageUpload {
    /// Builds a firmware upload bound to `instance`.
    #[must_use]
    pub fn firmware(name: impl Into<String>, instance: InstanceId, payload: Vec<u8>) -> Self {
        Self {
            kind: FIRMWARE_IMAGE_TYPE.to_owned(),
            encoding: FIRMWARE_IMAGE_ENCODING.to_owned(),
            name: name.into(),
            instance,
            payload,
        }
    }
}

impl fmt::Debug for ImageUpload {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ImageUpload")
            .field("kind", &self.kind)
            .field("encoding", &self.encoding)
            .field("name", &self.name)
            .field("instance", &self.instance)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Future returned by device-farm operations.
pub type FarmFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Remote operations consumed by a provisioning run.
pub trait DeviceFarm: Send + Sync {
    /// Provider specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Exchanges an API token for a session used by every later call.
    fn authenticate<'a>(&'a self, token: &'a ApiToken) -> FarmFuture<'a, (), Self::Error>;

    /// Lists the projects visible to the session.
    fn list_projects(&self) -> FarmFuture<'_, Vec<Project>, Self::Error>;

    /// Lists the board catalog in service order.
    fn list_models(&self) -> FarmFuture<'_, Vec<Model>, Self::Error>;

    /// Lists the base firmware available for `model`.
    fn list_model_software<'a>(
        &'a self,
        model: &'a str,
    ) -> FarmFuture<'a, Vec<Software>, Self::Error>;

    /// Creates an instance.
    fn create_instance<'a>(
        &'a self,
        request: &'a CreateInstanceRequest,
    ) -> FarmFuture<'a, Instance, Self::Error>;

    /// Fetches the current lifecycle state of an instance.
    fn instance_state<'a>(
        &'a self,
        id: &'a InstanceId,
    ) -> FarmFuture<'a, InstanceState, Self::Error>;

    /// Uploads a binary image bound to an instance.
    fn create_image<'a>(&'a self, upload: &'a ImageUpload) -> FarmFuture<'a, Image, Self::Error>;

    /// Reboots an instance.
    fn reboot_instance<'a>(&'a self, id: &'a InstanceId) -> FarmFuture<'a, (), Self::Error>;

    /// Deletes an instance.
    fn delete_instance<'a>(&'a self, id: &'a InstanceId) -> FarmFuture<'a, (), Self::Error>;

    /// Returns the console endpoint of an instance.
    fn console_endpoint<'a>(
        &'a self,
        id: &'a InstanceId,
    ) -> FarmFuture<'a, ConsoleEndpoint, Self::Error>;

    /// Opens the console stream behind `endpoint`.
    fn open_console<'a>(
        &'a self,
        endpoint: &'a ConsoleEndpoint,
    ) -> FarmFuture<'a, ConsoleStream, Self::Error>;
}
