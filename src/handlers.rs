//! Request handlers: one per form submission, file upload, and history view.
//!
//! Each handler takes the persisted state in [`AppContext`] plus the user's
//! input, appends to the prediction log when it succeeds, and returns
//! [`Rendered`] output. Failures the user can fix by changing their input
//! come back as [`Rendered::Error`]; anything else is an `Err`. A prediction
//! that cannot be logged is still rendered, with the log failure noted.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use churn_io::{
    table_to_csv_bytes, LogBatch, LogFilter, PredictionLog, RawTable, TableReader,
};
use churn_model::{CustomerRecord, FieldValue, ModelError, Predictor};
use clap::Args;
use tracing::{info, instrument, warn};

use crate::render;

const PREVIEW_ROWS: usize = 10;

/// Persisted state shared by all handlers.
pub struct AppContext {
    pub model_path: PathBuf,
    pub log: Box<dyn PredictionLog>,
}

impl AppContext {
    pub fn new(model_path: impl Into<PathBuf>, log: impl PredictionLog + 'static) -> Self {
        Self {
            model_path: model_path.into(),
            log: Box::new(log),
        }
    }
}

/// A file offered for download alongside rendered output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Success {
        body: String,
        download: Option<Download>,
    },
    Error {
        message: String,
    },
}

impl Rendered {
    fn text(body: String) -> Self {
        Self::Success {
            body,
            download: None,
        }
    }

    fn error(message: impl ToString) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }
}

fn user_error_or(e: ModelError) -> Result<Rendered, ModelError> {
    if e.is_input_error() {
        warn!(error = %e, "rejected input");
        Ok(Rendered::error(e))
    } else {
        Err(e)
    }
}

/// Append to the log, turning a write failure into a note for the user.
fn append_or_note(ctx: &AppContext, batch: &LogBatch) -> Result<usize, String> {
    ctx.log.append(batch).map_err(|e| {
        warn!(error = %e, "predictions not logged");
        format!("not logged: {e}")
    })
}

/// The customer form. Defaults match a blank form.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct FormInput {
    #[arg(long, default_value = "Female", value_parser = ["Female", "Male"])]
    pub gender: String,

    /// Yes/No; stored as 1/0 like the training data
    #[arg(long, default_value = "No", value_parser = ["No", "Yes"])]
    pub senior_citizen: String,

    #[arg(long, default_value = "No", value_parser = ["No", "Yes"])]
    pub partner: String,

    #[arg(long, default_value = "No", value_parser = ["No", "Yes"])]
    pub dependents: String,

    /// Months as a customer
    #[arg(long, default_value_t = 12, value_parser = clap::value_parser!(u32).range(0..=72))]
    pub tenure: u32,

    #[arg(long, default_value = "No", value_parser = ["No", "Yes"])]
    pub phone_service: String,

    #[arg(long, default_value = "No", value_parser = ["No", "Yes", "No phone service"])]
    pub multiple_lines: String,

    #[arg(long, default_value = "No", value_parser = ["No", "DSL", "Fiber optic"])]
    pub internet_service: String,

    #[arg(long, default_value = "No", value_parser = ["No", "Yes", "No internet service"])]
    pub online_security: String,

    #[arg(long, default_value = "No", value_parser = ["No", "Yes", "No internet service"])]
    pub online_backup: String,

    #[arg(long, default_value = "No", value_parser = ["No", "Yes", "No internet service"])]
    pub device_protection: String,

    #[arg(long, default_value = "No", value_parser = ["No", "Yes", "No internet service"])]
    pub tech_support: String,

    #[arg(long, default_value = "No", value_parser = ["No", "Yes", "No internet service"])]
    pub streaming_tv: String,

    #[arg(long, default_value = "No", value_parser = ["No", "Yes", "No internet service"])]
    pub streaming_movies: String,

    #[arg(long, default_value = "Month-to-month", value_parser = ["Month-to-month", "One year", "Two year"])]
    pub contract: String,

    #[arg(long, default_value = "No", value_parser = ["No", "Yes"])]
    pub paperless_billing: String,

    #[arg(
        long,
        default_value = "Electronic check",
        value_parser = ["Electronic check", "Mailed check", "Bank transfer (automatic)", "Credit card (automatic)"]
    )]
    pub payment_method: String,

    #[arg(long, default_value_t = 70.0)]
    pub monthly_charges: f64,

    #[arg(long, default_value_t = 1500.0)]
    pub total_charges: f64,
}

impl Default for FormInput {
    fn default() -> Self {
        let no = || "No".to_string();
        Self {
            gender: "Female".to_string(),
            senior_citizen: no(),
            partner: no(),
            dependents: no(),
            tenure: 12,
            phone_service: no(),
            multiple_lines: no(),
            internet_service: no(),
            online_security: no(),
            online_backup: no(),
            device_protection: no(),
            tech_support: no(),
            streaming_tv: no(),
            streaming_movies: no(),
            contract: "Month-to-month".to_string(),
            paperless_billing: no(),
            payment_method: "Electronic check".to_string(),
            monthly_charges: 70.0,
            total_charges: 1500.0,
        }
    }
}

impl FormInput {
    /// Customer record keyed by training column names.
    #[must_use]
    pub fn to_record(&self) -> CustomerRecord {
        let senior = u32::from(self.senior_citizen == "Yes");
        CustomerRecord::new()
            .with("gender", self.gender.as_str())
            .with("SeniorCitizen", senior)
            .with("Partner", self.partner.as_str())
            .with("Dependents", self.dependents.as_str())
            .with("tenure", self.tenure)
            .with("PhoneService", self.phone_service.as_str())
            .with("MultipleLines", self.multiple_lines.as_str())
            .with("InternetService", self.internet_service.as_str())
            .with("OnlineSecurity", self.online_security.as_str())
            .with("OnlineBackup", self.online_backup.as_str())
            .with("DeviceProtection", self.device_protection.as_str())
            .with("TechSupport", self.tech_support.as_str())
            .with("StreamingTV", self.streaming_tv.as_str())
            .with("StreamingMovies", self.streaming_movies.as_str())
            .with("Contract", self.contract.as_str())
            .with("PaperlessBilling", self.paperless_billing.as_str())
            .with("PaymentMethod", self.payment_method.as_str())
            .with("MonthlyCharges", self.monthly_charges)
            .with("TotalCharges", self.total_charges)
    }
}

/// Predict one customer from the form and log it.
///
/// The prediction is computed before the log append. If the append fails
/// the prediction is still rendered and the failure is noted under it.
///
/// # Errors
///
/// Unknown categories and other record errors propagate, as do model load
/// failures.
#[instrument(skip_all, fields(model = %ctx.model_path.display()))]
pub fn handle_form_submission(
    ctx: &AppContext,
    input: &FormInput,
    now: DateTime<Utc>,
) -> Result<Rendered, ModelError> {
    let record = input.to_record();
    let predictor = Predictor::load(&ctx.model_path)?;
    let prediction = predictor.predict_record(&record)?;

    let schema = &predictor.artifact().schema;
    let headers: Vec<String> = schema.names().map(String::from).collect();
    let row: Vec<String> = headers
        .iter()
        .map(|name| record.get(name).map(FieldValue::to_string).unwrap_or_default())
        .collect();
    let inputs = RawTable::new(headers, vec![row])?;
    let logged = append_or_note(
        ctx,
        &LogBatch::new(
            inputs,
            vec![prediction.churn_prediction],
            vec![prediction.churn_probability],
            now,
        )?,
    );

    info!(
        churn_prediction = prediction.churn_prediction,
        churn_probability = prediction.churn_probability,
        "form prediction"
    );
    let mut body = render::prediction(&prediction);
    if let Err(note) = logged {
        body = format!("{body}\nPrediction {note}\n");
    }
    Ok(Rendered::text(body))
}

/// Predict every row of an uploaded CSV, log them, and offer the results.
///
/// A repeated header in the first data row is dropped. Missing columns and
/// unusable values are reported without touching the log. A failed log
/// append is noted in the output; the results are still offered.
///
/// # Errors
///
/// Model load failures.
#[instrument(skip(ctx, content, now), fields(n_bytes = content.len()))]
pub fn handle_batch_upload(
    ctx: &AppContext,
    upload_name: &str,
    content: &[u8],
    now: DateTime<Utc>,
) -> Result<Rendered, ModelError> {
    let mut table = match TableReader::from_reader(content, upload_name).read() {
        Ok(table) => table,
        Err(e) => return user_error_or(e.into()),
    };
    if table.drop_duplicate_header() {
        info!("dropped repeated header row");
    }
    if table.is_empty() {
        return Ok(Rendered::error(format!("{upload_name} has no data rows")));
    }

    let predictor = Predictor::load(&ctx.model_path)?;
    let batch = match predictor.predict_table(&table) {
        Ok(batch) => batch,
        Err(e) => return user_error_or(e),
    };

    let logged = match append_or_note(
        ctx,
        &LogBatch::new(
            batch.features.clone(),
            batch.predictions.clone(),
            batch.probabilities.clone(),
            now,
        )?,
    ) {
        Ok(written) => format!("logged {written}"),
        Err(note) => note,
    };

    let n_churn = batch.n_churn();
    let body = format!(
        "Predicted {} customers, {logged}.\n\n{}\n{}\n{}",
        batch.len(),
        render::table_preview(&batch.results, PREVIEW_ROWS),
        render::class_counts(n_churn, batch.len() - n_churn),
        render::probability_histogram(&batch.probabilities),
    );
    Ok(Rendered::Success {
        body,
        download: Some(Download {
            file_name: "churn_predictions.csv".to_string(),
            bytes: table_to_csv_bytes(&batch.results)?,
        }),
    })
}

/// Show the filtered prediction log with summary charts and a CSV export.
///
/// # Errors
///
/// Log read failures.
#[instrument(skip_all)]
pub fn handle_history(ctx: &AppContext, filter: &LogFilter) -> Result<Rendered, ModelError> {
    let history = ctx.log.filter(filter)?;
    if history.is_empty() {
        return Ok(Rendered::text("No logged predictions match.\n".to_string()));
    }

    let (n_churn, n_retained) = history.class_counts();
    let probabilities: Vec<f64> = history.entries.iter().map(|e| e.probability).collect();
    let table = history.to_table();
    let body = format!(
        "{} logged predictions.\n\n{}\n{}\n{}",
        history.len(),
        render::table_preview(&table, PREVIEW_ROWS),
        render::class_counts(n_churn, n_retained),
        render::probability_histogram(&probabilities),
    );
    Ok(Rendered::Success {
        body,
        download: Some(Download {
            file_name: "prediction_history.csv".to_string(),
            bytes: table_to_csv_bytes(&table)?,
        }),
    })
}

#[cfg(test)]
mod tests {
    use std::fmt::Write as _;
    use std::path::Path;

    use chrono::TimeZone;
    use churn_io::CsvPredictionLog;
    use churn_model::{prepare_table, PrepareConfig, Trainer, TrainerConfig};
    use churn_rf::RandomForestConfig;
    use tempfile::TempDir;

    use super::*;

    const FEATURES: &str = "gender,SeniorCitizen,Partner,Dependents,tenure,PhoneService,\
MultipleLines,InternetService,OnlineSecurity,OnlineBackup,DeviceProtection,TechSupport,\
StreamingTV,StreamingMovies,Contract,PaperlessBilling,PaymentMethod,MonthlyCharges,TotalCharges";

    const PAYMENT: [&str; 4] = [
        "Electronic check",
        "Mailed check",
        "Bank transfer (automatic)",
        "Credit card (automatic)",
    ];

    fn yes_no(yes: bool) -> &'static str {
        if yes { "Yes" } else { "No" }
    }

    /// Deterministic customer rows; every third customer churns.
    fn customer_rows(n: usize, with_id_and_target: bool) -> String {
        let mut csv = String::new();
        for i in 0..n {
            let churned = i % 3 == 0;
            let tenure = if churned { 1 + i % 10 } else { 20 + i % 50 };
            let phone = yes_no(i % 7 != 0);
            let lines = if phone == "No" { "No phone service" } else { yes_no(i % 4 == 0) };
            let internet = if churned { "Fiber optic" } else { ["DSL", "No", "Fiber optic"][(i / 3) % 3] };
            let addon = |k: usize| {
                if internet == "No" { "No internet service" } else { yes_no((i / 2 + k) % 2 == 0) }
            };
            let contract = if churned {
                "Month-to-month"
            } else {
                ["Month-to-month", "One year", "Two year"][(i / 5) % 3]
            };
            let monthly = if churned { 80 + i % 20 } else { 30 + i % 40 };
            let total = if i % 37 == 5 { " ".to_string() } else { (monthly * tenure).to_string() };

            if with_id_and_target {
                let _ = write!(csv, "{i:04}-TEST,");
            }
            let _ = write!(
                csv,
                "{},{},{},{},{tenure},{phone},{lines},{internet},{},{},{},{},{},{},{contract},{},\"{}\",{monthly},{total}",
                ["Female", "Male"][i % 2],
                u8::from(i % 5 == 0),
                yes_no(i % 2 == 0),
                yes_no(i % 3 == 1),
                addon(0),
                addon(1),
                addon(2),
                addon(3),
                addon(4),
                addon(5),
                yes_no(i % 2 == 1),
                PAYMENT[i % 4],
            );
            if with_id_and_target {
                let _ = write!(csv, ",{}", yes_no(churned));
            }
            csv.push('\n');
        }
        csv
    }

    fn upload(n: usize) -> String {
        format!("{FEATURES}\n{}", customer_rows(n, false))
    }

    struct Fixture {
        _dir: TempDir,
        ctx: AppContext,
        log_path: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let training = format!("customerID,{FEATURES},Churn\n{}", customer_rows(120, true));
        let table = TableReader::from_reader(training.as_bytes(), "train.csv").read().unwrap();
        let prepared = prepare_table(table, &PrepareConfig::default()).unwrap();
        let outcome = Trainer::new(TrainerConfig::new(RandomForestConfig::new(15).unwrap()))
            .train(&prepared)
            .unwrap();
        let model_path = dir.path().join("models").join("churn_model.bin");
        outcome.artifact.save(&model_path).unwrap();

        let log_path = dir.path().join("logs").join("predictions.csv");
        let ctx = AppContext::new(model_path, CsvPredictionLog::new(&log_path));
        Fixture {
            _dir: dir,
            ctx,
            log_path,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 14, 0, 0).unwrap()
    }

    fn n_logged(fx: &Fixture) -> usize {
        fx.ctx.log.read_all().unwrap().len()
    }

    #[test]
    fn form_defaults_predict_and_log() {
        let fx = fixture();
        let rendered = handle_form_submission(&fx.ctx, &FormInput::default(), now()).unwrap();
        match rendered {
            Rendered::Success { body, download } => {
                assert!(body.starts_with("Churn prediction: "));
                assert!(body.contains("Churn probability: "));
                assert!(download.is_none());
            }
            Rendered::Error { message } => panic!("unexpected error {message}"),
        }

        let history = fx.ctx.log.read_all().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.input_columns.len(), 19);
        let senior = history.input_columns.iter().position(|c| c == "SeniorCitizen").unwrap();
        assert_eq!(history.entries[0].inputs[senior], "0");
        assert_eq!(history.entries[0].timestamp, now());
    }

    #[test]
    fn form_unknown_category_is_an_error() {
        let fx = fixture();
        let input = FormInput {
            contract: "Three year".to_string(),
            ..FormInput::default()
        };
        let err = handle_form_submission(&fx.ctx, &input, now()).unwrap_err();
        assert!(matches!(err, ModelError::UnknownCategory { .. }));
        assert_eq!(n_logged(&fx), 0);
    }

    #[test]
    fn batch_adds_columns_and_logs_every_row() {
        let fx = fixture();
        let rendered = handle_batch_upload(&fx.ctx, "upload.csv", upload(12).as_bytes(), now()).unwrap();
        let Rendered::Success { body, download } = rendered else {
            panic!("expected success");
        };
        assert!(body.contains("Predicted 12 customers, logged 12."));
        assert!(body.contains("Churn probability distribution"));

        let download = download.unwrap();
        let results = TableReader::from_reader(download.bytes.as_slice(), "download")
            .read()
            .unwrap();
        assert_eq!(results.n_rows(), 12);
        assert_eq!(results.headers().len(), 21);
        assert_eq!(&results.headers()[19..], &["prediction", "probability"]);

        assert_eq!(n_logged(&fx), 12);
        handle_batch_upload(&fx.ctx, "second.csv", upload(5).as_bytes(), now()).unwrap();
        assert_eq!(n_logged(&fx), 17);
    }

    #[test]
    fn batch_missing_column_reports_and_skips_log() {
        let fx = fixture();
        let csv = upload(4).replace("Contract,", "Plan,");
        let rendered = handle_batch_upload(&fx.ctx, "upload.csv", csv.as_bytes(), now()).unwrap();
        match rendered {
            Rendered::Error { message } => assert!(message.contains("Contract"), "{message}"),
            other => panic!("expected error, got {other:?}"),
        }
        assert!(!fx.log_path.exists());
    }

    #[test]
    fn batch_bad_csv_reports() {
        let fx = fixture();
        let csv = format!("{FEATURES}\nFemale,0\n");
        let rendered = handle_batch_upload(&fx.ctx, "upload.csv", csv.as_bytes(), now()).unwrap();
        assert!(matches!(rendered, Rendered::Error { .. }));

        let header_only = format!("{FEATURES}\n{FEATURES}\n");
        let rendered = handle_batch_upload(&fx.ctx, "upload.csv", header_only.as_bytes(), now()).unwrap();
        assert!(matches!(rendered, Rendered::Error { .. }));
        assert!(!fx.log_path.exists());
    }

    #[test]
    fn batch_drops_repeated_header() {
        let fx = fixture();
        let csv = format!("{FEATURES}\n{FEATURES}\n{}", customer_rows(3, false));
        let rendered = handle_batch_upload(&fx.ctx, "upload.csv", csv.as_bytes(), now()).unwrap();
        assert!(matches!(rendered, Rendered::Success { .. }));
        assert_eq!(n_logged(&fx), 3);
    }

    #[test]
    fn history_filters_and_exports() {
        let fx = fixture();
        let empty = handle_history(&fx.ctx, &LogFilter::new()).unwrap();
        assert_eq!(empty, Rendered::text("No logged predictions match.\n".to_string()));

        handle_batch_upload(&fx.ctx, "upload.csv", upload(9).as_bytes(), now()).unwrap();
        let all = fx.ctx.log.read_all().unwrap();
        let (n_churn, _) = all.class_counts();
        // short-tenure fiber customers on monthly contracts
        assert!(n_churn > 0);

        let Rendered::Success { body, download } =
            handle_history(&fx.ctx, &LogFilter::new().with_prediction(1)).unwrap()
        else {
            panic!("expected success");
        };
        assert!(body.starts_with(&format!("{n_churn} logged predictions.")));
        let export = download.unwrap();
        assert_eq!(export.file_name, "prediction_history.csv");
        let table = TableReader::from_reader(export.bytes.as_slice(), "export").read().unwrap();
        assert_eq!(table.n_rows(), n_churn);
        assert_eq!(table.headers().last().map(String::as_str), Some("timestamp"));
    }

    /// A log left behind by a model trained on other columns.
    fn write_foreign_log(fx: &Fixture) -> String {
        let foreign = "plan,prediction,probability,timestamp\nbasic,0,0.1,2024-01-01T00:00:00Z\n";
        std::fs::create_dir_all(fx.log_path.parent().unwrap()).unwrap();
        std::fs::write(&fx.log_path, foreign).unwrap();
        foreign.to_string()
    }

    #[test]
    fn form_prediction_survives_log_schema_mismatch() {
        let fx = fixture();
        let foreign = write_foreign_log(&fx);

        let rendered = handle_form_submission(&fx.ctx, &FormInput::default(), now()).unwrap();
        let Rendered::Success { body, .. } = rendered else {
            panic!("expected success");
        };
        assert!(body.starts_with("Churn prediction: "));
        assert!(body.contains("Prediction not logged: "), "{body}");
        assert_eq!(std::fs::read_to_string(&fx.log_path).unwrap(), foreign);
    }

    #[test]
    fn batch_results_survive_log_schema_mismatch() {
        let fx = fixture();
        let foreign = write_foreign_log(&fx);

        let rendered = handle_batch_upload(&fx.ctx, "upload.csv", upload(6).as_bytes(), now()).unwrap();
        let Rendered::Success { body, download } = rendered else {
            panic!("expected success");
        };
        assert!(body.starts_with("Predicted 6 customers, not logged: "), "{body}");
        let results = download.unwrap();
        let table = TableReader::from_reader(results.bytes.as_slice(), "download").read().unwrap();
        assert_eq!(table.n_rows(), 6);
        assert_eq!(std::fs::read_to_string(&fx.log_path).unwrap(), foreign);
    }

    #[test]
    fn missing_model_is_not_a_user_error() {
        let dir = TempDir::new().unwrap();
        let ctx = AppContext::new(
            Path::new("/nonexistent/churn_model.bin"),
            CsvPredictionLog::new(dir.path().join("log.csv")),
        );
        assert!(matches!(
            handle_form_submission(&ctx, &FormInput::default(), now()),
            Err(ModelError::ReadModel { .. })
        ));
    }
}
