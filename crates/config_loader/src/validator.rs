//! 配置校验模块
//!
//! 校验规则：
//! - 字段范围 (由 `validator` derive 声明，见 contracts::SessionBlueprint)
//! - parquet: queue_size > max_buffer_size
//! - 至少启用一个 sink
//! - broadcast endpoint 必须是 tcp://host:port

use std::borrow::Cow;

use contracts::{ContractError, SessionBlueprint};
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

/// 校验 SessionBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    validate_fields(blueprint)?;
    validate_sink_selection(blueprint)?;
    validate_broadcast_endpoint(blueprint)?;
    Ok(())
}

/// 字段级规则
fn validate_fields(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    match blueprint.validate() {
        Ok(()) => Ok(()),
        Err(errors) => {
            let (field, message) = first_violation(&errors, "")
                .unwrap_or_else(|| (String::new(), errors.to_string()));
            Err(ContractError::config_validation(field, message))
        }
    }
}

/// 至少一个输出
fn validate_sink_selection(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    if blueprint.enabled_sinks().is_empty() {
        return Err(ContractError::config_validation(
            "sinks",
            "at least one sink must be enabled",
        ));
    }
    Ok(())
}

/// 校验 broadcast endpoint 格式
fn validate_broadcast_endpoint(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    let broadcast = &blueprint.sinks.broadcast;
    if !broadcast.enabled {
        return Ok(());
    }

    let address = broadcast.endpoint.strip_prefix("tcp://").ok_or_else(|| {
        ContractError::config_validation(
            "sinks.broadcast.endpoint",
            format!("endpoint '{}' must start with tcp://", broadcast.endpoint),
        )
    })?;

    let port = address.rsplit_once(':').map(|(_, port)| port);
    if port.and_then(|p| p.parse::<u16>().ok()).is_none() {
        return Err(ContractError::config_validation(
            "sinks.broadcast.endpoint",
            format!("endpoint '{}' must include a port", broadcast.endpoint),
        ));
    }
    Ok(())
}

/// 深度优先找到第一个违规字段 (按字段名排序，保证输出稳定)
fn first_violation(errors: &ValidationErrors, prefix: &str) -> Option<(String, String)> {
    let mut fields: Vec<_> = errors.errors().iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    for (field, kind) in fields {
        let path = join_path(prefix, field);
        let found = match kind {
            ValidationErrorsKind::Field(errs) => errs.first().map(|e| (path, describe(e))),
            ValidationErrorsKind::Struct(inner) => first_violation(inner, &path),
            ValidationErrorsKind::List(items) => items
                .iter()
                .find_map(|(idx, inner)| first_violation(inner, &format!("{path}[{idx}]"))),
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

fn join_path(prefix: &str, field: &Cow<'static, str>) -> String {
    // schema-level errors are keyed "__all__" and belong to the struct itself
    if field == "__all__" {
        prefix.to_string()
    } else if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

fn describe(error: &ValidationError) -> String {
    if let Some(message) = &error.message {
        return message.to_string();
    }
    match error.params.get("value") {
        Some(value) => format!("failed '{}' check (value: {value})", error.code),
        None => format!("failed '{}' check", error.code),
    }
}
