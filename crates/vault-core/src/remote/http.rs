//! JSON-over-HTTP document collection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{
    PageRequest, RemoteCollection, RemoteDocument, RemoteError, RemoteListFilter, RemoteOutcome,
    RemotePage, RemoteResult,
};
use crate::auth::IdentityProvider;
use crate::models::RemoteId;
use crate::util::{normalize_base_url, parse_api_error};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Serialize)]
struct CreateBody<'a> {
    uid: &'a str,
    #[serde(flatten)]
    document: &'a RemoteDocument,
}

#[derive(Deserialize)]
struct CreatedResponse {
    id: String,
}

pub struct HttpRemoteCollection {
    base_url: String,
    collection: String,
    client: Client,
    identity: Arc<dyn IdentityProvider>,
}

impl HttpRemoteCollection {
    pub fn new(
        base_url: &str,
        collection: &str,
        identity: Arc<dyn IdentityProvider>,
    ) -> RemoteResult<Self> {
        let base_url =
            normalize_base_url(base_url, "api_base_url").map_err(RemoteError::InvalidConfiguration)?;
        let collection = collection.trim();
        if collection.is_empty() {
            return Err(RemoteError::InvalidConfiguration(
                "collection must not be empty".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            collection: collection.to_string(),
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            identity,
        })
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/v1/collections/{}/documents",
            self.base_url,
            urlencoding::encode(&self.collection)
        )
    }

    fn document_url(&self, remote_id: &RemoteId) -> String {
        format!(
            "{}/{}",
            self.documents_url(),
            urlencoding::encode(remote_id.as_str())
        )
    }

    async fn authorized(&self, request: RequestBuilder) -> RemoteResult<RequestBuilder> {
        let identity = self.identity.ensure_signed_in().await?;
        Ok(match identity.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = self.authorized(request).await?.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = parse_api_error(status, &body);
        if status == StatusCode::SERVICE_UNAVAILABLE || status == StatusCode::TOO_MANY_REQUESTS {
            Err(RemoteError::Unavailable(message))
        } else {
            Err(RemoteError::Api(message))
        }
    }

    async fn try_create(&self, document: &RemoteDocument, owner_id: &str) -> RemoteResult<RemoteId> {
        let body = CreateBody {
            uid: owner_id,
            document,
        };
        let response = self
            .send(self.client.post(self.documents_url()).json(&body))
            .await?;
        let text = response.text().await?;
        let created: CreatedResponse = serde_json::from_str(&text)
            .map_err(|error| RemoteError::InvalidPayload(error.to_string()))?;
        if created.id.trim().is_empty() {
            return Err(RemoteError::InvalidPayload(
                "create response carried an empty id".to_string(),
            ));
        }
        Ok(RemoteId::new(created.id))
    }
}

#[async_trait]
impl RemoteCollection for HttpRemoteCollection {
    async fn create(&self, document: &RemoteDocument, owner_id: &str) -> RemoteOutcome {
        match self.try_create(document, owner_id).await {
            Ok(remote_id) => RemoteOutcome::Created { remote_id },
            Err(error) => RemoteOutcome::failed(error),
        }
    }

    async fn update(&self, remote_id: &RemoteId, document: &RemoteDocument) -> RemoteOutcome {
        match self
            .send(self.client.patch(self.document_url(remote_id)).json(document))
            .await
        {
            Ok(_) => RemoteOutcome::Updated,
            Err(error) => RemoteOutcome::failed(error),
        }
    }

    async fn delete(&self, remote_id: &RemoteId) -> RemoteOutcome {
        match self.send(self.client.delete(self.document_url(remote_id))).await {
            Ok(_) => RemoteOutcome::Deleted,
            Err(error) => RemoteOutcome::failed(error),
        }
    }

    async fn list(
        &self,
        filter: &RemoteListFilter,
        page: &PageRequest,
    ) -> RemoteResult<RemotePage> {
        let mut query = vec![("limit", page.limit.to_string())];
        if let Some(cursor) = &page.cursor {
            query.push(("cursor", cursor.clone()));
        }
        if let Some(owner_id) = &filter.owner_id {
            query.push(("owner", owner_id.clone()));
        }
        if let Some(platform) = filter.platform {
            query.push(("platform", platform.as_str().to_string()));
        }
        if let Some(status) = filter.status {
            query.push(("status", status.as_str().to_string()));
        }
        if let Some(tag) = &filter.tag {
            query.push(("tag", tag.clone()));
        }

        let response = self
            .send(self.client.get(self.documents_url()).query(&query))
            .await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|error| RemoteError::InvalidPayload(error.to_string()))
    }
}
