use std::cmp::Ordering;

use super::super::domain::{Qualification, QualificationStatusDetails};

/// Drops qualifications still pending an external decision (awaiting or under
/// consideration); everything else passes through in its original order.
pub fn pending_for_processing(qualifications: Vec<Qualification>) -> Vec<Qualification> {
    qualifications
        .into_iter()
        .filter(|qualification| {
            !matches!(
                qualification.status_details,
                Some(QualificationStatusDetails::Awaiting)
                    | Some(QualificationStatusDetails::Consideration)
            )
        })
        .collect()
}

/// Ranks candidates in promotion order. Under a scoring reduction the order
/// is scoring descending with date ascending as tie-break, qualifications
/// without a score after all scored ones; otherwise date ascending. The sort
/// is stable, so equal keys keep their stored order.
pub fn rank_for_selection(qualifications: &mut [Qualification], by_scoring: bool) {
    if by_scoring {
        qualifications.sort_by(|a, b| match (a.scoring, b.scoring) {
            (Some(left), Some(right)) => right.cmp(&left).then(a.date.cmp(&b.date)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.date.cmp(&b.date),
        });
    } else {
        qualifications.sort_by_key(|qualification| qualification.date);
    }
}
