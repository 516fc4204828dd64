//! Binary classification metrics. Class `1` is the positive class.

use crate::artifact::ClassificationMetricArtifact;

/// Accuracy, precision, recall and F1 of `predicted` against `actual`.
///
/// Precision, recall and F1 are `0.0` when their denominator is zero.
pub fn classification_metrics(actual: &[i64], predicted: &[i64]) -> ClassificationMetricArtifact {
    let total = actual.len().min(predicted.len());
    if total == 0 {
        return ClassificationMetricArtifact::default();
    }

    let (mut tp, mut fp, mut fn_, mut correct) = (0usize, 0usize, 0usize, 0usize);
    for (a, p) in actual.iter().zip(predicted) {
        match (*a == 1, *p == 1) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
        if a == p {
            correct += 1;
        }
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };

    ClassificationMetricArtifact {
        f1_score: f1,
        precision_score: precision,
        recall_score: recall,
        accuracy: correct as f64 / total as f64,
    }
}
