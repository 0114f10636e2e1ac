use crate::config::{self, EngineConfig, MasteryThresholds, WeightPolicy};
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{db_conn, db_query_err, db_update_err};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_policy_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match config::load_engine_config(conn) {
        Ok(cfg) => ok(&req.id, json!({ "policy": cfg })),
        Err(e) => db_query_err(req, e),
    }
}

fn handle_policy_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let mut cfg: EngineConfig = match config::load_engine_config(conn) {
        Ok(c) => c,
        Err(e) => return db_query_err(req, e),
    };

    let weight_policy = req.params.get("weightPolicy").filter(|v| !v.is_null());
    let thresholds = req.params.get("thresholds").filter(|v| !v.is_null());
    if weight_policy.is_none() && thresholds.is_none() {
        return err(
            &req.id,
            "bad_params",
            "expected weightPolicy and/or thresholds",
            None,
        );
    }

    if let Some(raw) = weight_policy {
        match serde_json::from_value::<WeightPolicy>(raw.clone()) {
            Ok(p) => cfg.weight_policy = p,
            Err(e) => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("weightPolicy is malformed: {e}"),
                    None,
                )
            }
        }
    }
    if let Some(raw) = thresholds {
        match serde_json::from_value::<MasteryThresholds>(raw.clone()) {
            Ok(t) => cfg.thresholds = t,
            Err(e) => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("thresholds is malformed: {e}"),
                    None,
                )
            }
        }
    }

    if let Err(e) = cfg.validate() {
        tracing::debug!(error = %e, "policy update rejected");
        return engine_err(&req.id, &e);
    }
    if let Err(e) = config::save_engine_config(conn, &cfg) {
        return db_update_err(req, e);
    }
    tracing::info!(
        bands = cfg.weight_policy.bands.len(),
        pass = cfg.thresholds.pass_percent,
        proficient = cfg.thresholds.proficient_percent,
        "engine policy updated"
    );
    ok(&req.id, json!({ "policy": cfg }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "policy.get" => Some(handle_policy_get(state, req)),
        "policy.update" => Some(handle_policy_update(state, req)),
        _ => None,
    }
}
