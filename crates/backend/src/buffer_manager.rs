// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! BufferManager: mints buffer access URLs for persistent and ephemeral
//! buffers (spec §4.6).

use crate::signing::{ResourceType, SasAction, SigningError, SigningService};
use chrono::{DateTime, Duration, Utc};
use tyger_core::{BufferDirection, BufferId};

const DEFAULT_TTL_MINUTES: i64 = 60;

/// Where an ephemeral buffer's relay listens, as assigned by the backend
/// at workload-creation time.
#[derive(Debug, Clone)]
pub struct RelayEndpoint {
    pub socket_path: String,
    pub host: String,
    pub port: u16,
}

pub struct BufferManager<'a> {
    signing: &'a SigningService,
}

impl<'a> BufferManager<'a> {
    pub fn new(signing: &'a SigningService) -> Self {
        Self { signing }
    }

    fn actions_for(direction: BufferDirection) -> SasAction {
        match direction {
            BufferDirection::Input => SasAction::READ,
            BufferDirection::Output => SasAction::CREATE,
        }
    }

    /// Mints a signed URL for a persistent buffer backed by object
    /// storage, bounded by `ttl` (spec §4.6 bullet 1). The account/
    /// container addressing is left to the caller's storage adapter;
    /// this only produces the signed query string component.
    pub fn sign_persistent_buffer_url(
        &self,
        buffer_id: &BufferId,
        direction: BufferDirection,
        storage_base_url: &str,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<String, SigningError> {
        let query = self.signing.sign_sas_query_string(
            buffer_id,
            ResourceType::Blob,
            Self::actions_for(direction),
            ttl.unwrap_or_else(|| Duration::minutes(DEFAULT_TTL_MINUTES)),
            now,
        )?;
        Ok(format!("{storage_base_url}?{query}"))
    }

    /// Mints a signed URL for an ephemeral (local-relay) buffer (spec
    /// §4.6 bullet 2): `http+unix://<socket-path>:?<signedQuery>&relay=true`
    /// by default, or `http://<host>:<port>/?<signedQuery>&relay=true`
    /// when `prefer_tcp` is requested.
    pub fn sign_ephemeral_buffer_url(
        &self,
        buffer_id: &BufferId,
        direction: BufferDirection,
        endpoint: &RelayEndpoint,
        prefer_tcp: bool,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<String, SigningError> {
        let query = self.signing.sign_sas_query_string(
            buffer_id,
            ResourceType::Blob,
            Self::actions_for(direction),
            ttl.unwrap_or_else(|| Duration::minutes(DEFAULT_TTL_MINUTES)),
            now,
        )?;
        let url = if prefer_tcp {
            format!("http://{}:{}/?{}&relay=true", endpoint.host, endpoint.port, query)
        } else {
            format!("http+unix://{}:?{}&relay=true", endpoint.socket_path, query)
        };
        Ok(url)
    }
}
