//! Wires Resolver → Invoker → Shaper → Error Mapper into one call.

use std::sync::Arc;

use pgrpc_core::error::GatewayError;
use pgrpc_core::error_mapper::{map_procedure_error, sign_v1_error, MappedError, SignedErrorEnvelope};
use pgrpc_core::model::MethodCall;
use pgrpc_core::resolver::Resolver;
use pgrpc_core::shaper::shape;
use pgrpc_postgres::{ConnectionFacade, PgCatalogQueries, PgErrorCodeLookup, PgSigner};
use serde_json::Value;

use crate::rpc::code_for;

pub struct AppState {
    pub resolver: Resolver<PgCatalogQueries>,
    pub facade: ConnectionFacade,
    pub error_lookup: PgErrorCodeLookup,
    pub signer: PgSigner,
}

/// What a resolved call turned into, already reduced to the shape the HTTP
/// layer needs to pick a response envelope.
pub enum CallOutcome {
    Success(Value),
    Taxonomy(GatewayError),
    Procedure(MappedError),
    SignedProcedure(SignedErrorEnvelope),
}

impl AppState {
    pub async fn handle(self: &Arc<Self>, call: MethodCall) -> CallOutcome {
        let is_v1 = call.is_v1();
        let method = call.method.clone();
        let uuid = call
            .params
            .get("UUID")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_default();

        let started = std::time::Instant::now();
        let outcome = async {
            let resolved = self.resolver.resolve(&call).await?;
            let rowset = self.facade.call_proc(&resolved).await?;
            let value = shape(&rowset, resolved.returns_set, resolved.returns_json)?;
            Ok((resolved.schema, resolved.proc, rowset.len(), value))
        }
        .await;

        match outcome {
            Ok((schema, proc, row_count, value)) => {
                tracing::info!(
                    method = %method,
                    schema = %schema.as_deref().unwrap_or(""),
                    proc = %proc,
                    row_count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "call resolved"
                );
                CallOutcome::Success(value)
            }
            Err(err) => self.map_failure(is_v1, &method, &uuid, err).await,
        }
    }

    async fn map_failure(
        &self,
        is_v1: bool,
        method: &str,
        uuid: &str,
        err: GatewayError,
    ) -> CallOutcome {
        // A malformed envelope always gets the fixed 400 body (§6/§7),
        // regardless of whether `params` happened to look v1-shaped — the
        // method failed the identifier check before v1-ness was ever
        // relevant, so it must never be wrapped in a signed envelope.
        if matches!(err, GatewayError::InvalidRequest) {
            return CallOutcome::Taxonomy(err);
        }

        if !is_v1 {
            return match err {
                GatewayError::ProcedureError { message, .. } => {
                    CallOutcome::Procedure(map_procedure_error(&self.error_lookup, &message).await)
                }
                other => CallOutcome::Taxonomy(other),
            };
        }

        let mapped = match &err {
            GatewayError::ProcedureError { message, .. } => {
                map_procedure_error(&self.error_lookup, message).await
            }
            other => MappedError {
                name: "JSONRPCError",
                message: other.to_string(),
                code: code_for(other),
            },
        };

        let signed = sign_v1_error(&self.signer, method, uuid, mapped).await;
        CallOutcome::SignedProcedure(signed)
    }
}
