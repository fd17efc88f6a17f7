//! AVH REST implementation of [`DeviceFarm`].

mod error;
mod wire;

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;

use crate::console::{self, ConsoleStream};
use crate::farm::{
    ApiToken, ConsoleEndpoint, CreateInstanceRequest, DeviceFarm, FarmFuture, Image, ImageUpload,
    Instance, InstanceId, InstanceState, Model, Project, Software,
};
use wire::{LoginRequest, LoginResponse, decode_state};

pub use error::AvhError;

/// Service root used when no endpoint is configured.
pub const DEFAULT_ENDPOINT: &str = "https://app.avh.arm.com/api";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the AVH REST API.
///
/// The client starts unauthenticated; [`DeviceFarm::authenticate`] stores the
/// session token sent as a bearer credential by every later call.
#[derive(Debug)]
pub struct AvhClient {
    http: reqwest::Client,
    endpoint: String,
    base: Url,
    access_token: RwLock<Option<String>>,
}

impl AvhClient {
    /// Creates a client rooted at `endpoint` (for example
    /// `https://app.avh.arm.com/api`).
    ///
    /// # Errors
    ///
    /// Returns [`AvhError::Client`] when `endpoint` is not a URL that can
    /// carry a path or the HTTP client cannot be built.
    pub fn new(endpoint: &str) -> Result<Self, AvhError> {
        let root = endpoint.trim_end_matches('/');
        let base = Url::parse(root).map_err(|err| AvhError::Client {
            message: format!("invalid endpoint `{root}`: {err}"),
        })?;
        if base.cannot_be_a_base() {
            return Err(AvhError::Client {
                message: format!("invalid endpoint `{root}`: not a base URL"),
            });
        }
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| AvhError::Client {
                message: err.to_string(),
            })?;
        Ok(Self {
            http,
            endpoint: root.to_owned(),
            base,
            access_token: RwLock::new(None),
        })
    }

    /// Returns the service root without a trailing slash.
    #[must_use]
    pub const fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    /// Reports whether a session token is held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Appends `segments` to the service root, percent-encoding each one so
    /// identifiers cannot change the route.
    fn url(&self, segments: &[&str]) -> Result<Url, AvhError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| AvhError::Client {
                message: format!("invalid endpoint `{}`: not a base URL", self.endpoint),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorised(
        &self,
        method: Method,
        segments: &[&str],
        operation: &'static str,
    ) -> Result<RequestBuilder, AvhError> {
        let url = self.url(segments)?;
        let guard = self
            .access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let token = guard
            .as_deref()
            .ok_or(AvhError::Unauthenticated { operation })?;
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(token))
    }

    async fn send(request: RequestBuilder, operation: &'static str) -> Result<Response, AvhError> {
        let response = request.send().await.map_err(|err| AvhError::Http {
            operation,
            message: err.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(AvhError::Status {
            operation,
            status: status.as_u16(),
            body,
        })
    }

    async fn read_text(response: Response, operation: &'static str) -> Result<String, AvhError> {
        response.text().await.map_err(|err| AvhError::Http {
            operation,
            message: err.to_string(),
        })
    }

    async fn decode<T>(response: Response, operation: &'static str) -> Result<T, AvhError>
    where
        T: DeserializeOwned,
    {
        let body = Self::read_text(response, operation).await?;
        serde_json::from_str(&body).map_err(|err| AvhError::Decode {
            operation,
            message: err.to_string(),
        })
    }

    async fn get_json<T>(&self, segments: &[&str], operation: &'static str) -> Result<T, AvhError>
    where
        T: DeserializeOwned,
    {
        let request = self.authorised(Method::GET, segments, operation)?;
        let response = Self::send(request, operation).await?;
        Self::decode(response, operation).await
    }

    async fn login(&self, token: &ApiToken) -> Result<(), AvhError> {
        const OPERATION: &str = "login";
        let request = self
            .http
            .post(self.url(&["v1", "auth", "login"])?)
            .json(&LoginRequest {
                api_token: token.expose(),
            });
        let response = Self::send(request, OPERATION).await?;
        let session: LoginResponse = Self::decode(response, OPERATION).await?;
        *self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(session.token);
        Ok(())
    }

    async fn upload(&self, upload: &ImageUpload) -> Result<Image, AvhError> {
        const OPERATION: &str = "create image";
        let file = Part::bytes(upload.payload.clone()).file_name(upload.name.clone());
        let form = Form::new()
            .text("type", upload.kind.clone())
            .text("encoding", upload.encoding.clone())
            .text("name", upload.name.clone())
            .text("instance", upload.instance.to_string())
            .part("file", file);
        let request = self
            .authorised(Method::POST, &["v1", "images"], OPERATION)?
            .multipart(form);
        let response = Self::send(request, OPERATION).await?;
        Self::decode(response, OPERATION).await
    }
}

impl DeviceFarm for AvhClient {
    type Error = AvhError;

    fn authenticate<'a>(&'a self, token: &'a ApiToken) -> FarmFuture<'a, (), Self::Error> {
        Box::pin(self.login(token))
    }

    fn list_projects(&self) -> FarmFuture<'_, Vec<Project>, Self::Error> {
        Box::pin(self.get_json(&["v1", "projects"], "list projects"))
    }

    fn list_models(&self) -> FarmFuture<'_, Vec<Model>, Self::Error> {
        Box::pin(self.get_json(&["v1", "models"], "list models"))
    }

    fn list_model_software<'a>(
        &'a self,
        model: &'a str,
    ) -> FarmFuture<'a, Vec<Software>, Self::Error> {
        Box::pin(async move {
            self.get_json(&["v1", "models", model, "software"], "list model software")
                .await
        })
    }

    fn create_instance<'a>(
        &'a self,
        request: &'a CreateInstanceRequest,
    ) -> FarmFuture<'a, Instance, Self::Error> {
        Box::pin(async move {
            const OPERATION: &str = "create instance";
            let builder = self
                .authorised(Method::POST, &["v1", "instances"], OPERATION)?
                .json(request);
            let response = Self::send(builder, OPERATION).await?;
            Self::decode(response, OPERATION).await
        })
    }

    fn instance_state<'a>(
        &'a self,
        id: &'a InstanceId,
    ) -> FarmFuture<'a, InstanceState, Self::Error> {
        Box::pin(async move {
            const OPERATION: &str = "instance state";
            let request = self.authorised(
                Method::GET,
                &["v1", "instances", id.as_str(), "state"],
                OPERATION,
            )?;
            let response = Self::send(request, OPERATION).await?;
            let body = Self::read_text(response, OPERATION).await?;
            Ok(InstanceState::new(decode_state(&body)))
        })
    }

    fn create_image<'a>(&'a self, upload: &'a ImageUpload) -> FarmFuture<'a, Image, Self::Error> {
        Box::pin(self.upload(upload))
    }

    fn reboot_instance<'a>(&'a self, id: &'a InstanceId) -> FarmFuture<'a, (), Self::Error> {
        Box::pin(async move {
            const OPERATION: &str = "reboot instance";
            let request = self.authorised(
                Method::POST,
                &["v1", "instances", id.as_str(), "reboot"],
                OPERATION,
            )?;
            Self::send(request, OPERATION).await.map(drop)
        })
    }

    fn delete_instance<'a>(&'a self, id: &'a InstanceId) -> FarmFuture<'a, (), Self::Error> {
        Box::pin(async move {
            const OPERATION: &str = "delete instance";
            let request =
                self.authorised(Method::DELETE, &["v1", "instances", id.as_str()], OPERATION)?;
            Self::send(request, OPERATION).await.map(drop)
        })
    }

    fn console_endpoint<'a>(
        &'a self,
        id: &'a InstanceId,
    ) -> FarmFuture<'a, ConsoleEndpoint, Self::Error> {
        Box::pin(async move {
            self.get_json(
                &["v1", "instances", id.as_str(), "console"],
                "console endpoint",
            )
            .await
        })
    }

    fn open_console<'a>(
        &'a self,
        endpoint: &'a ConsoleEndpoint,
    ) -> FarmFuture<'a, ConsoleStream, Self::Error> {
        Box::pin(async move {
            console::connect(&endpoint.url)
                .await
                .map_err(AvhError::from)
        })
    }
}
