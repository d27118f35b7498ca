use domain_pricing::{CommitmentRequest, InstanceRequest, PricingError, PricingService};
use eyre::{Result, eyre};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::Commands;

/// Execute one subcommand and return its JSON result
pub async fn run(service: &PricingService, command: Commands) -> Result<Value> {
    match command {
        Commands::Instance {
            instance_type,
            region,
            os,
            billing,
            term,
            payment,
        } => {
            let mut request = InstanceRequest::on_demand(instance_type, region, os);
            if billing != domain_pricing::BillingModel::OnDemand {
                request = request.with_commitment(billing, term, payment);
            }
            let quote = service.resolve_instance(request).await?;
            Ok(json!({
                "quote": quote,
                "monthly_cost": quote.monthly_cost(),
            }))
        }

        Commands::Storage {
            volume_type,
            region,
            size_gb,
        } => {
            let quote = service.resolve_storage_price(&volume_type, &region).await?;
            Ok(json!({
                "quote": quote,
                "monthly_cost": size_gb.map(|size| quote.monthly_cost(size)),
            }))
        }

        Commands::Commitment {
            instance_type,
            region,
            plan,
            term,
            payment,
            os,
        } => {
            let quote = service
                .resolve_commitment_plan(CommitmentRequest {
                    instance_type,
                    region,
                    operating_system: os,
                    plan_type: plan,
                    term,
                    payment_option: payment,
                })
                .await?;
            Ok(serde_json::to_value(quote)?)
        }

        Commands::Batch {
            region,
            instance_types,
            os,
        } => match service.resolve_batch(&instance_types, &region, os).await {
            Ok(outcome) => {
                info!(
                    total = outcome.total,
                    succeeded = outcome.successes.len(),
                    "Batch accepted"
                );
                Ok(serde_json::to_value(outcome)?)
            }
            Err(PricingError::LowBatchSuccessRate { failed, .. }) if !failed.is_empty() => {
                for failure in &failed {
                    warn!(key = %failure.key, reason = %failure.reason, "Batch key failed");
                }
                Err(eyre!(
                    "batch rejected: {} of {} instance types failed",
                    failed.len(),
                    instance_types.len()
                ))
            }
            Err(e) => Err(e.into()),
        },

        Commands::Alternative {
            instance_type,
            region,
            os,
        } => {
            let resolution = service
                .resolve_available_alternative(&instance_type, &region, os)
                .await?;
            Ok(serde_json::to_value(resolution)?)
        }

        Commands::Available {
            instance_type,
            region,
        } => {
            let available = service.is_available(&instance_type, &region).await?;
            Ok(json!({
                "instance_type": instance_type,
                "region": region,
                "available": available,
            }))
        }

        Commands::Invalidate { pattern } => {
            let removed = service.invalidate_cache(&pattern).await?;
            Ok(json!({ "pattern": pattern, "removed": removed }))
        }
    }
}
