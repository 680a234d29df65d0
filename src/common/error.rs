use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::billing_month::{BillingMonth, MonthParseError};

// Erros do núcleo de cobrança. Toda operação devolve um destes identificando a entidade problemática.
#[derive(Debug, Error)]
pub enum AppError {
    // --- NotFound ---
    #[error("Contrato {0} não encontrado")]
    ContractNotFound(i64),

    #[error("Fatura {0} não encontrada")]
    InvoiceNotFound(i64),

    #[error("Pagamento {0} não encontrado")]
    PaymentNotFound(i64),

    // --- ValidationError ---
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Entrada inválida: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    InvalidMonth(#[from] MonthParseError),

    #[error("Fatura {invoice_id} pertence ao contrato {invoice_contract_id}, não ao contrato {contract_id}")]
    ContractMismatch {
        invoice_id: i64,
        invoice_contract_id: i64,
        contract_id: i64,
    },

    #[error("Alocação de {requested} excede o saldo disponível de {available} ({entity} {id})")]
    OverAllocated {
        entity: &'static str,
        id: i64,
        available: i64,
        requested: i64,
    },

    // --- ConsistencyWarning ---
    #[error("Contrato {contract_id} ficaria com mais de uma fatura na competência {billing_month}")]
    MonthCollision {
        contract_id: i64,
        billing_month: BillingMonth,
        invoice_ids: Vec<i64>,
    },

    // --- StorageError ---
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),
}

/// Constraint `UNIQUE (contract_id, billing_month)` da tabela `invoices` (adiada até o commit).
pub const MONTH_UNIQUE_CONSTRAINT: &str = "uq_invoices_contract_month";

impl AppError {
    /// O banco recusou a gravação porque o contrato ficaria com duas faturas na mesma competência.
    pub fn is_month_unique_violation(&self) -> bool {
        match self {
            AppError::DatabaseError(sqlx::Error::Database(db)) => {
                db.constraint() == Some(MONTH_UNIQUE_CONSTRAINT)
            }
            _ => false,
        }
    }

    /// Troca a violação de unicidade vinda do banco pelo `MonthCollision` equivalente.
    /// Qualquer outro erro passa intacto.
    pub fn or_month_collision(
        self,
        contract_id: i64,
        billing_month: BillingMonth,
        invoice_ids: Vec<i64>,
    ) -> AppError {
        if !self.is_month_unique_violation() {
            return self;
        }
        tracing::warn!(
            "⚠️ Commit recusado: contrato {} com fatura duplicada em {}",
            contract_id, billing_month
        );
        AppError::MonthCollision { contract_id, billing_month, invoice_ids }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ContractNotFound(_)
            | AppError::InvoiceNotFound(_)
            | AppError::PaymentNotFound(_) => StatusCode::NOT_FOUND,
            AppError::ValidationError(_)
            | AppError::InvalidInput(_)
            | AppError::InvalidMonth(_) => StatusCode::BAD_REQUEST,
            AppError::ContractMismatch { .. } | AppError::OverAllocated { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::MonthCollision { .. } => StatusCode::CONFLICT,
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            // Retorna todos os detalhes da validação, campo a campo.
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| e.code.to_string())
                        })
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                json!({
                    "error": "Um ou mais campos são inválidos.",
                    "details": details,
                })
            }
            AppError::ContractMismatch { invoice_id, invoice_contract_id, contract_id } => json!({
                "error": self.to_string(),
                "details": {
                    "invoiceId": invoice_id,
                    "invoiceContractId": invoice_contract_id,
                    "contractId": contract_id,
                },
            }),
            AppError::OverAllocated { entity, id, available, requested } => json!({
                "error": self.to_string(),
                "details": {
                    "entity": entity,
                    "id": id,
                    "available": available,
                    "requested": requested,
                },
            }),
            AppError::MonthCollision { contract_id, billing_month, invoice_ids } => json!({
                "error": self.to_string(),
                "details": {
                    "contractId": contract_id,
                    "billingMonth": billing_month,
                    "invoiceIds": invoice_ids,
                },
            }),
            // DatabaseError e InternalServerError viram 500 sem vazar detalhes;
            // o `tracing` loga a mensagem completa.
            AppError::DatabaseError(e) => {
                tracing::error!("Erro de banco de dados: {:?}", e);
                json!({ "error": "Ocorreu um erro inesperado." })
            }
            AppError::InternalServerError(e) => {
                tracing::error!("Erro Interno do Servidor: {:?}", e);
                json!({ "error": "Ocorreu um erro inesperado." })
            }
            other => json!({ "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_http_statuses() {
        assert_eq!(AppError::InvoiceNotFound(1).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::InvalidInput("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::MonthCollision {
                contract_id: 1,
                billing_month: "2024-01".parse().unwrap(),
                invoice_ids: vec![1, 2],
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::DatabaseError(sqlx::Error::PoolTimedOut).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn only_the_month_constraint_becomes_a_collision() {
        let month: BillingMonth = "2024-05".parse().unwrap();

        let err = AppError::DatabaseError(sqlx::Error::PoolTimedOut).or_month_collision(1, month, vec![9]);
        assert!(matches!(err, AppError::DatabaseError(_)));

        let err = AppError::InvoiceNotFound(3).or_month_collision(1, month, vec![9]);
        assert!(matches!(err, AppError::InvoiceNotFound(3)));
    }

    #[test]
    fn month_parse_errors_are_validation_errors() {
        let err: AppError = "2024-13".parse::<BillingMonth>().unwrap_err().into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("2024-13"));
    }
}
