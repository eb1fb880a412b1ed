//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;

use tokio::sync::mpsc::Sender;
use tokio::sync::oneshot;

use crate::lsdb::{AdjacencyDatabase, PrefixDatabase};
use crate::policy::{PolicyError, RibPolicySpec};
use crate::route::{RouteDatabase, StaticRoutes};

// Introspection requests, served on the instance event loop. Each request
// carries a one-shot channel that the loop fulfills.
#[derive(Debug)]
pub enum ApiRequest {
    GetRouteDatabase {
        node: Option<String>,
        responder: oneshot::Sender<RouteDatabase>,
    },
    GetStaticRoutes {
        responder: oneshot::Sender<StaticRoutes>,
    },
    // Adjacency databases of the default area.
    GetAdjacencyDatabases {
        responder: oneshot::Sender<Vec<AdjacencyDatabase>>,
    },
    GetAllAdjacencyDatabases {
        responder: oneshot::Sender<Vec<AdjacencyDatabase>>,
    },
    GetPrefixDatabases {
        responder: oneshot::Sender<BTreeMap<String, PrefixDatabase>>,
    },
    SetRibPolicy {
        policy: RibPolicySpec,
        responder: oneshot::Sender<Result<(), PolicyError>>,
    },
    GetRibPolicy {
        responder: oneshot::Sender<Result<RibPolicySpec, PolicyError>>,
    },
}

// Cloneable request handle.
#[derive(Clone, Debug)]
pub struct DecisionApi {
    request_tx: Sender<ApiRequest>,
}

// ===== impl DecisionApi =====

impl DecisionApi {
    pub(crate) fn new(request_tx: Sender<ApiRequest>) -> DecisionApi {
        DecisionApi { request_tx }
    }

    // Route database from the perspective of the given node (the local
    // node when unset), including static MPLS routes.
    pub async fn route_database(
        &self,
        node: Option<String>,
    ) -> Option<RouteDatabase> {
        let (responder, response) = oneshot::channel();
        self.request_tx
            .send(ApiRequest::GetRouteDatabase { node, responder })
            .await
            .ok()?;
        response.await.ok()
    }

    pub async fn static_routes(&self) -> Option<StaticRoutes> {
        let (responder, response) = oneshot::channel();
        self.request_tx
            .send(ApiRequest::GetStaticRoutes { responder })
            .await
            .ok()?;
        response.await.ok()
    }

    pub async fn adjacency_databases(
        &self,
    ) -> Option<Vec<AdjacencyDatabase>> {
        let (responder, response) = oneshot::channel();
        self.request_tx
            .send(ApiRequest::GetAdjacencyDatabases { responder })
            .await
            .ok()?;
        response.await.ok()
    }

    pub async fn all_adjacency_databases(
        &self,
    ) -> Option<Vec<AdjacencyDatabase>> {
        let (responder, response) = oneshot::channel();
        self.request_tx
            .send(ApiRequest::GetAllAdjacencyDatabases { responder })
            .await
            .ok()?;
        response.await.ok()
    }

    pub async fn prefix_databases(
        &self,
    ) -> Option<BTreeMap<String, PrefixDatabase>> {
        let (responder, response) = oneshot::channel();
        self.request_tx
            .send(ApiRequest::GetPrefixDatabases { responder })
            .await
            .ok()?;
        response.await.ok()
    }

    pub async fn set_rib_policy(
        &self,
        policy: RibPolicySpec,
    ) -> Result<(), PolicyError> {
        let (responder, response) = oneshot::channel();
        self.request_tx
            .send(ApiRequest::SetRibPolicy { policy, responder })
            .await
            .map_err(|_| {
                PolicyError::Invalid("decision is shutting down".to_owned())
            })?;
        response.await.map_err(|_| {
            PolicyError::Invalid("decision is shutting down".to_owned())
        })?
    }

    pub async fn rib_policy(&self) -> Result<RibPolicySpec, PolicyError> {
        let (responder, response) = oneshot::channel();
        self.request_tx
            .send(ApiRequest::GetRibPolicy { responder })
            .await
            .map_err(|_| {
                PolicyError::Invalid("decision is shutting down".to_owned())
            })?;
        response.await.map_err(|_| {
            PolicyError::Invalid("decision is shutting down".to_owned())
        })?
    }
}
