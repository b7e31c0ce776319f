use serde::{Deserialize, Serialize};

/// Per-experiment pretraining record: one average loss per completed epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PretrainHistory {
    pub experiment: String,
    pub loss: Vec<f64>,
}

impl PretrainHistory {
    pub fn new(experiment: impl Into<String>) -> Self {
        PretrainHistory {
            experiment: experiment.into(),
            loss: Vec::new(),
        }
    }

    pub fn record_epoch(&mut self, average_loss: f64) {
        self.loss.push(average_loss);
    }

    /// Completed epochs so far.
    pub fn epochs(&self) -> usize {
        self.loss.len()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("history serializes")
    }
}

/// Downstream classification record (train/val loss and accuracy per epoch).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyHistory {
    pub experiment: String,
    pub model: String,
    pub train_loss: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub acc_train: Vec<f64>,
    pub acc_val: Vec<f64>,
    pub best_val_acc: f64,
}

impl ClassifyHistory {
    pub fn new(experiment: impl Into<String>, model: impl Into<String>) -> Self {
        ClassifyHistory {
            experiment: experiment.into(),
            model: model.into(),
            train_loss: Vec::new(),
            val_loss: Vec::new(),
            acc_train: Vec::new(),
            acc_val: Vec::new(),
            best_val_acc: 0.0,
        }
    }

    pub fn record_epoch(&mut self, train_loss: f64, acc_train: f64, val_loss: f64, acc_val: f64) {
        self.train_loss.push(train_loss);
        self.acc_train.push(acc_train);
        self.val_loss.push(val_loss);
        self.acc_val.push(acc_val);
        if acc_val > self.best_val_acc {
            self.best_val_acc = acc_val;
        }
    }

    pub fn epochs(&self) -> usize {
        self.train_loss.len()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("history serializes")
    }
}
