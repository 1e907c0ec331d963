use std::fmt::Write as _;

use helmsman_rollout::BatchPlan;

pub fn plan(
    units: u32,
    batch_size_percentage: u32,
    error_tolerance_percentage: u32,
    format: &str,
) -> anyhow::Result<String> {
    let plan = BatchPlan::new(units, batch_size_percentage, error_tolerance_percentage)?;

    match format {
        "json" => Ok(serde_json::to_string_pretty(&plan)?),
        _ => {
            let mut out = format!(
                "{} units → {} batches of up to {} (error budget {})\n",
                plan.total_units,
                plan.num_batches(),
                plan.batch_size,
                plan.error_budget
            );
            for (i, size) in plan.batches.iter().enumerate() {
                writeln!(out, "  batch {:>3}: {size} units", i + 1)?;
            }
            Ok(out.trim_end().to_string())
        }
    }
}
