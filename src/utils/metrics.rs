//! Metrics Module for Model Evaluation
//!
//! Provides the metrics used by the MedNIST pipeline:
//! - One-vs-rest macro ROC AUC for validation
//! - Confusion matrix with per-class precision, recall, F1 and support
//! - A fixed-width classification report
//! - Running averages for epoch losses

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Area under the ROC curve for one binary problem.
///
/// Uses the rank-sum formulation with average ranks for tied scores.
/// Returns `None` when there are no positives or no negatives.
pub fn binary_roc_auc(scores: &[f32], positives: &[bool]) -> Option<f64> {
    assert_eq!(
        scores.len(),
        positives.len(),
        "Scores and labels must have same length"
    );

    let n_pos = positives.iter().filter(|&&p| p).count();
    let n_neg = positives.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[a]
            .partial_cmp(&scores[b])
            .unwrap_or(Ordering::Equal)
    });

    let mut rank_sum_pos = 0.0f64;
    let mut i = 0;
    while i < order.len() {
        let mut j = i + 1;
        while j < order.len() && scores[order[j]] == scores[order[i]] {
            j += 1;
        }
        // ranks i+1..=j share their mean
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        for &idx in &order[i..j] {
            if positives[idx] {
                rank_sum_pos += avg_rank;
            }
        }
        i = j;
    }

    let n_pos_f = n_pos as f64;
    let u = rank_sum_pos - n_pos_f * (n_pos_f + 1.0) / 2.0;
    Some(u / (n_pos_f * n_neg as f64))
}

/// One-vs-rest ROC AUC averaged over classes.
///
/// `probabilities[i]` holds the class scores of sample `i`. Returns `None`
/// if any class in `0..num_classes` has no positive or no negative sample,
/// so a partial average is never reported.
pub fn roc_auc_ovr_macro(
    probabilities: &[Vec<f32>],
    labels: &[usize],
    num_classes: usize,
) -> Option<f64> {
    assert_eq!(
        probabilities.len(),
        labels.len(),
        "Probabilities and labels must have same length"
    );
    if num_classes == 0 {
        return None;
    }

    let per_class = (0..num_classes)
        .map(|class_idx| {
            let scores: Vec<f32> = probabilities
                .iter()
                .map(|row| row.get(class_idx).copied().unwrap_or(0.0))
                .collect();
            let positives: Vec<bool> = labels.iter().map(|&l| l == class_idx).collect();
            binary_roc_auc(&scores, &positives)
        })
        .collect::<Option<Vec<f64>>>()?;

    Some(per_class.iter().sum::<f64>() / per_class.len() as f64)
}

/// Index of the largest score in each row
pub fn argmax_rows(probabilities: &[Vec<f32>]) -> Vec<usize> {
    probabilities
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(Ordering::Equal))
                .map(|(i, _)| i)
                .unwrap_or(0)
        })
        .collect()
}

/// Fraction of matching entries
pub fn accuracy(predictions: &[usize], ground_truth: &[usize]) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    let correct = predictions
        .iter()
        .zip(ground_truth.iter())
        .filter(|(p, g)| p == g)
        .count();
    correct as f64 / predictions.len() as f64
}

/// Per-class metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// Class index
    pub class_idx: usize,

    /// True positives
    pub true_positives: usize,

    /// False positives
    pub false_positives: usize,

    /// False negatives
    pub false_negatives: usize,

    /// Precision = TP / (TP + FP)
    pub precision: f64,

    /// Recall = TP / (TP + FN)
    pub recall: f64,

    /// F1 = 2 * (precision * recall) / (precision + recall)
    pub f1: f64,

    /// Support = number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    /// Calculate metrics for a class from confusion matrix.
    /// Any zero denominator yields 0.
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize) -> Self {
        let true_positives = cm.get(class_idx, class_idx);

        // predicted as this class but actually another
        let false_positives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(i, class_idx))
            .sum();

        // actually this class but predicted as another
        let false_negatives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(class_idx, i))
            .sum();

        let support = true_positives + false_negatives;

        let precision = if true_positives + false_positives > 0 {
            true_positives as f64 / (true_positives + false_positives) as f64
        } else {
            0.0
        };

        let recall = if support > 0 {
            true_positives as f64 / support as f64
        } else {
            0.0
        };

        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_idx,
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
            support,
        }
    }
}

/// Confusion Matrix for multi-class classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Number of classes
    pub num_classes: usize,

    /// Row = actual, column = predicted, flat row-major
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Create confusion matrix from predictions and ground truth
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        let mut cm = Self::new(num_classes);

        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            cm.add(actual, pred);
        }

        cm
    }

    /// Add a single prediction to the matrix
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            let idx = actual * self.num_classes + predicted;
            self.matrix[idx] += 1;
        }
    }

    /// Get the count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Diagonal sum
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Pretty print the matrix with abbreviated class names
    pub fn display(&self, class_names: &[String]) -> String {
        let mut output = String::new();
        output.push_str("Confusion Matrix (rows=actual, cols=predicted):\n\n");

        output.push_str("           ");
        for col in 0..self.num_classes {
            let name = class_names.get(col).map(String::as_str).unwrap_or("?");
            output.push_str(&format!("{:>10}", truncate(name, 9)));
        }
        output.push('\n');

        for row in 0..self.num_classes {
            let name = class_names.get(row).map(String::as_str).unwrap_or("?");
            output.push_str(&format!("{:>10} ", truncate(name, 10)));
            for col in 0..self.num_classes {
                output.push_str(&format!("{:>10}", self.get(row, col)));
            }
            output.push('\n');
        }

        output
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Per-class precision/recall/F1/support with accuracy and averages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub class_names: Vec<String>,
    pub per_class: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub total_samples: usize,
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_f1: f64,
    pub weighted_precision: f64,
    pub weighted_recall: f64,
    pub weighted_f1: f64,
    pub confusion_matrix: ConfusionMatrix,
    /// Decimal places used when rendering
    pub digits: usize,
}

impl ClassificationReport {
    /// Build a report over every class in `class_names`, including classes
    /// that never occur in the data.
    pub fn new(predictions: &[usize], ground_truth: &[usize], class_names: &[String]) -> Self {
        assert_eq!(
            predictions.len(),
            ground_truth.len(),
            "Predictions and ground truth must have same length"
        );

        let num_classes = class_names.len();
        let confusion_matrix =
            ConfusionMatrix::from_predictions(predictions, ground_truth, num_classes);

        let per_class: Vec<ClassMetrics> = (0..num_classes)
            .map(|c| ClassMetrics::from_confusion_matrix(&confusion_matrix, c))
            .collect();

        let n = num_classes.max(1) as f64;
        let macro_precision = per_class.iter().map(|m| m.precision).sum::<f64>() / n;
        let macro_recall = per_class.iter().map(|m| m.recall).sum::<f64>() / n;
        let macro_f1 = per_class.iter().map(|m| m.f1).sum::<f64>() / n;

        let total_support: usize = per_class.iter().map(|m| m.support).sum();
        let weighted = |f: fn(&ClassMetrics) -> f64| {
            if total_support == 0 {
                0.0
            } else {
                per_class
                    .iter()
                    .map(|m| f(m) * m.support as f64)
                    .sum::<f64>()
                    / total_support as f64
            }
        };
        let weighted_precision = weighted(|m| m.precision);
        let weighted_recall = weighted(|m| m.recall);
        let weighted_f1 = weighted(|m| m.f1);

        Self {
            class_names: class_names.to_vec(),
            per_class,
            accuracy: confusion_matrix.accuracy(),
            total_samples: predictions.len(),
            macro_precision,
            macro_recall,
            macro_f1,
            weighted_precision,
            weighted_recall,
            weighted_f1,
            confusion_matrix,
            digits: 4,
        }
    }

    /// Render as a fixed-width text table
    pub fn render(&self) -> String {
        const LAST_LINE: &str = "weighted avg";
        let digits = self.digits;
        let width = self
            .class_names
            .iter()
            .map(|n| n.chars().count())
            .chain([LAST_LINE.len(), digits])
            .max()
            .unwrap_or(LAST_LINE.len());

        let row = |name: &str, p: f64, r: f64, f: f64, support: usize| {
            format!(
                "{:>width$}  {:>9.digits$} {:>9.digits$} {:>9.digits$} {:>9}\n",
                name,
                p,
                r,
                f,
                support,
                width = width,
                digits = digits
            )
        };

        let mut out = format!(
            "{:>width$}  {:>9} {:>9} {:>9} {:>9}\n\n",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            width = width
        );

        for (name, m) in self.class_names.iter().zip(self.per_class.iter()) {
            out.push_str(&row(name, m.precision, m.recall, m.f1, m.support));
        }
        out.push('\n');

        out.push_str(&format!(
            "{:>width$}  {:>9} {:>9} {:>9.digits$} {:>9}\n",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.total_samples,
            width = width,
            digits = digits
        ));
        out.push_str(&row(
            "macro avg",
            self.macro_precision,
            self.macro_recall,
            self.macro_f1,
            self.total_samples,
        ));
        out.push_str(&row(
            LAST_LINE,
            self.weighted_precision,
            self.weighted_recall,
            self.weighted_f1,
            self.total_samples,
        ));

        out
    }
}

impl std::fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Running average for tracking losses during training
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn average(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_binary_auc_perfect_and_reversed() {
        let positives = [false, false, true, true];
        let auc = binary_roc_auc(&[0.1, 0.2, 0.8, 0.9], &positives).unwrap();
        assert!((auc - 1.0).abs() < 1e-9);

        let auc = binary_roc_auc(&[0.9, 0.8, 0.2, 0.1], &positives).unwrap();
        assert!(auc.abs() < 1e-9);
    }

    #[test]
    fn test_binary_auc_ties_count_half() {
        let auc = binary_roc_auc(&[0.5, 0.5, 0.5, 0.5], &[true, false, true, false]).unwrap();
        assert!((auc - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_binary_auc_mixed() {
        // pos scores {0.35, 0.8}, neg scores {0.1, 0.4}: 3 of 4 pairs ordered
        let auc = binary_roc_auc(&[0.1, 0.4, 0.35, 0.8], &[false, false, true, true]).unwrap();
        assert!((auc - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_binary_auc_undefined() {
        assert!(binary_roc_auc(&[0.1, 0.2], &[true, true]).is_none());
        assert!(binary_roc_auc(&[0.1, 0.2], &[false, false]).is_none());
    }

    #[test]
    fn test_macro_auc_undefined_when_class_absent() {
        // class 2 never appears in labels
        let probs = vec![
            vec![0.9, 0.1, 0.0],
            vec![0.8, 0.2, 0.0],
            vec![0.2, 0.8, 0.0],
            vec![0.1, 0.9, 0.0],
        ];
        let labels = vec![0, 0, 1, 1];
        assert!(roc_auc_ovr_macro(&probs, &labels, 3).is_none());

        let auc = roc_auc_ovr_macro(&probs, &labels, 2).unwrap();
        assert!((auc - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_macro_auc_single_class_is_undefined() {
        let probs = vec![vec![1.0], vec![1.0]];
        assert!(roc_auc_ovr_macro(&probs, &[0, 0], 1).is_none());
    }

    #[test]
    fn test_argmax_and_accuracy() {
        let probs = vec![vec![0.1, 0.7, 0.2], vec![0.6, 0.3, 0.1]];
        let preds = argmax_rows(&probs);
        assert_eq!(preds, vec![1, 0]);
        assert!((accuracy(&preds, &[1, 1]) - 0.5).abs() < 1e-9);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn test_confusion_matrix() {
        let predictions = vec![0, 1, 2, 0, 1, 2, 0, 0, 2, 2];
        let ground_truth = vec![0, 1, 2, 0, 2, 2, 1, 0, 1, 2];

        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth, 3);

        assert_eq!(cm.get(0, 0), 3);
        assert_eq!(cm.get(1, 1), 1);
        assert_eq!(cm.get(2, 2), 3);
        assert_eq!(cm.total(), 10);
        assert_eq!(cm.correct(), 7);
        assert!((cm.accuracy() - 0.7).abs() < 0.001);
    }

    #[test]
    fn test_class_metrics() {
        let predictions = vec![0, 0, 0, 1, 1];
        let ground_truth = vec![0, 0, 1, 1, 0];

        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth, 2);
        let class0 = ClassMetrics::from_confusion_matrix(&cm, 0);

        // Class 0: TP=2, FP=1, FN=1
        assert_eq!(class0.true_positives, 2);
        assert_eq!(class0.false_positives, 1);
        assert_eq!(class0.false_negatives, 1);
        assert_eq!(class0.support, 3);
        assert!((class0.precision - 2.0 / 3.0).abs() < 0.001);
        assert!((class0.recall - 2.0 / 3.0).abs() < 0.001);
    }

    #[test]
    fn test_report_matches_hand_computed_values() {
        // Class 1: TP=1, FP=1, FN=1 -> P=R=F1=0.5
        let predictions = vec![0, 0, 0, 1, 1];
        let ground_truth = vec![0, 0, 1, 1, 0];
        let report = ClassificationReport::new(&predictions, &ground_truth, &names(&["A", "B"]));

        assert_eq!(report.per_class[1].support, 2);
        assert!((report.per_class[1].precision - 0.5).abs() < 1e-9);
        assert!((report.per_class[1].f1 - 0.5).abs() < 1e-9);
        assert!((report.accuracy - 0.6).abs() < 1e-9);

        let expected_macro_f1 = (2.0 / 3.0 + 0.5) / 2.0;
        assert!((report.macro_f1 - expected_macro_f1).abs() < 1e-9);
        let expected_weighted_f1 = (2.0 / 3.0 * 3.0 + 0.5 * 2.0) / 5.0;
        assert!((report.weighted_f1 - expected_weighted_f1).abs() < 1e-9);
    }

    #[test]
    fn test_report_zero_division_is_zero() {
        // class "C" is never predicted nor present
        let report = ClassificationReport::new(&[0, 1], &[0, 1], &names(&["A", "B", "C"]));
        let c = &report.per_class[2];
        assert_eq!(c.precision, 0.0);
        assert_eq!(c.recall, 0.0);
        assert_eq!(c.f1, 0.0);
        assert_eq!(c.support, 0);
        assert!((report.macro_precision - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_report_render_layout() {
        let report =
            ClassificationReport::new(&[0, 1, 1], &[0, 1, 0], &names(&["AbdomenCT", "Hand"]));
        let text = report.render();
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[0].contains("precision"));
        assert!(lines[0].ends_with("support"));
        assert!(lines[2].trim_start().starts_with("AbdomenCT"));
        assert!(lines[2].contains("1.0000"));
        assert!(text.contains("accuracy"));
        assert!(text.contains("0.6667"));
        assert!(text.contains("macro avg"));
        assert!(lines.last().unwrap().starts_with("weighted avg"));
    }

    #[test]
    fn test_running_average() {
        let mut avg = RunningAverage::new();

        avg.add(1.0);
        avg.add(2.0);
        avg.add(3.0);

        assert_eq!(avg.count(), 3);
        assert!((avg.average() - 2.0).abs() < 0.001);

        avg.reset();
        assert_eq!(avg.count(), 0);
        assert_eq!(avg.average(), 0.0);
    }
}
