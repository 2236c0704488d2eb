use rust_decimal::Decimal;

use super::super::domain::{
    CoefficientRate, CoefficientValue, Conversion, Criterion, DataError,
    QualificationSystemMethod, ReductionCriteria, RequirementResponse, RequirementResponseValue,
    Scoring,
};

/// Automated scoring applies only when the case both reduces by scoring and
/// qualifies automatically; every other combination leaves scoring to humans
/// or skips it entirely.
pub fn scoring_required(
    reduction_criteria: ReductionCriteria,
    method: QualificationSystemMethod,
) -> bool {
    matches!(
        (reduction_criteria, method),
        (ReductionCriteria::Scoring, QualificationSystemMethod::Automated)
    )
}

/// Product of all matched rates, scaled to three digits half-up. An empty
/// rate list is the multiplicative identity: no adjustment, score 1. A
/// negative product is a validation failure; rates arrive in caller payloads
/// and scoring must stay non-negative.
pub fn calculate_scoring(rates: &[CoefficientRate]) -> Result<Scoring, DataError> {
    let product = rates
        .iter()
        .fold(Decimal::ONE, |acc, rate| acc * rate.value());
    Scoring::from_product(product)
}

/// Exact variant-and-value match between a coefficient value and a response
/// value. No cross-type coercion.
pub fn value_matches(coefficient: &CoefficientValue, response: &RequirementResponseValue) -> bool {
    match (coefficient, response) {
        (CoefficientValue::Boolean(a), RequirementResponseValue::Boolean(b)) => a == b,
        (CoefficientValue::String(a), RequirementResponseValue::String(b)) => a == b,
        (CoefficientValue::Integer(a), RequirementResponseValue::Integer(b)) => a == b,
        (CoefficientValue::Number(a), RequirementResponseValue::Number(b)) => a == b,
        _ => false,
    }
}

/// Collects the coefficient rates a candidate's responses earn.
///
/// For each requirement referenced by the given criteria (in order), finds
/// the conversion whose `related_item` is that requirement, then the
/// candidate's response to it, and includes the rate of the first coefficient
/// whose value matches the response exactly. A requirement with no matching
/// conversion, response, or coefficient contributes nothing.
pub fn matched_coefficients(
    conversions: &[Conversion],
    criteria: &[Criterion],
    responses: &[RequirementResponse],
) -> Vec<CoefficientRate> {
    let mut rates = Vec::new();

    for criterion in criteria {
        for group in &criterion.requirement_groups {
            for requirement in &group.requirements {
                let Some(conversion) = conversions
                    .iter()
                    .find(|conversion| conversion.related_item == requirement.id)
                else {
                    continue;
                };
                let Some(response) = responses
                    .iter()
                    .find(|response| response.requirement.id == requirement.id)
                else {
                    continue;
                };
                if let Some(coefficient) = conversion
                    .coefficients
                    .iter()
                    .find(|coefficient| value_matches(&coefficient.value, &response.value))
                {
                    rates.push(coefficient.rate);
                }
            }
        }
    }

    rates
}
