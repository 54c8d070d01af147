//! IBM Quantum cloud provider.
//!
//! [`QuantumProvider`] is the seam between the dispatcher and the cloud.
//! [`IbmProvider`] talks to the IBM Quantum REST API with a blocking
//! `reqwest` client; [`MockProvider`] keeps jobs in memory for tests.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info};
use reqwest::blocking::{Client, Response as HttpResponse};
use reqwest::{header, StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::config::IbmConfig;
use crate::simulator::Circuit;
use crate::types::Bits;
use crate::QbitLinkError;

/// Default IBM Quantum API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.quantum-computing.ibm.com";

/// API token for the cloud service. The token never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    token: String,
}

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Cloud operations the bridge consumes.
pub trait QuantumProvider {
    /// Replace the credential used for subsequent calls.
    fn configure(&mut self, credentials: Credentials);

    /// Name of the least-busy operational hardware backend.
    fn least_busy_backend(&mut self) -> Result<String, QbitLinkError>;

    /// Submit `circuit` to `backend`; returns the job identifier.
    fn submit(&mut self, backend: &str, circuit: &Circuit) -> Result<String, QbitLinkError>;

    /// Provider status label for a job, verbatim.
    fn job_status(&mut self, job_id: &str) -> Result<String, QbitLinkError>;

    /// Measured outcome of a finished job.
    fn job_result(&mut self, job_id: &str) -> Result<Bits, QbitLinkError>;

    /// Submit to the least-busy backend without waiting for execution.
    fn submit_to_least_busy(&mut self, circuit: &Circuit) -> Result<String, QbitLinkError> {
        let backend = self.least_busy_backend()?;
        let job_id = self.submit(&backend, circuit)?;
        info!("Submitted {}-qubit job {job_id} to {backend}", circuit.num_qubits());
        Ok(job_id)
    }
}

/// Whether a status label means the job has not finished yet.
pub fn is_pending(status: &str) -> bool {
    matches!(
        status.to_ascii_uppercase().as_str(),
        "QUEUED" | "RUNNING" | "INITIALIZING" | "VALIDATING"
    )
}

/// Whether a status label means the job completed successfully.
pub fn is_completed(status: &str) -> bool {
    matches!(status.to_ascii_uppercase().as_str(), "DONE" | "COMPLETED")
}

/// Poll a job every `interval` until it leaves the queued/running states.
///
/// Returns the final status label. Fails if the job does not complete
/// successfully, or if `timeout` elapses first.
pub fn wait_for_job<P>(
    provider: &mut P,
    job_id: &str,
    interval: Duration,
    timeout: Option<Duration>,
) -> Result<String, QbitLinkError>
where
    P: QuantumProvider + ?Sized,
{
    let start = Instant::now();
    loop {
        let status = provider.job_status(job_id)?;
        if !is_pending(&status) {
            if is_completed(&status) {
                return Ok(status);
            }
            return Err(QbitLinkError::Provider(format!(
                "Job {job_id} ended with status {status}"
            )));
        }
        if let Some(limit) = timeout {
            if start.elapsed() >= limit {
                return Err(QbitLinkError::Provider(format!(
                    "Job {job_id} still {status} after {limit:?}"
                )));
            }
        }
        info!("Job status: {status}, waiting...");
        std::thread::sleep(interval);
    }
}

// ============================================================================
// REST client
// ============================================================================

/// Blocking IBM Quantum REST client.
pub struct IbmClient {
    client: Client,
    endpoint: String,
    instance: Option<String>,
}

impl fmt::Debug for IbmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IbmClient")
            .field("endpoint", &self.endpoint)
            .field("instance", &self.instance)
            .finish()
    }
}

impl IbmClient {
    pub fn new(
        endpoint: &str,
        credentials: &Credentials,
        instance: Option<String>,
        timeout: Duration,
    ) -> Result<Self, QbitLinkError> {
        let mut headers = header::HeaderMap::new();
        let bearer = header::HeaderValue::from_str(&format!("Bearer {}", credentials.token()))
            .map_err(|_| QbitLinkError::Provider("Token contains invalid characters".into()))?;
        headers.insert(header::AUTHORIZATION, bearer);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| QbitLinkError::Provider(format!("Failed to create client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            instance,
        })
    }

    pub fn list_backends(&self) -> Result<Vec<BackendInfo>, QbitLinkError> {
        let url = format!("{}/v1/backends", self.endpoint);
        let response = self.client.get(&url).send().map_err(request_failed)?;
        let backends: BackendsResponse = check(response, None)?.json().map_err(parse_failed)?;
        Ok(backends.backends)
    }

    pub fn submit_sampler_job(
        &self,
        backend: &str,
        circuit: &Circuit,
        shots: u32,
    ) -> Result<SubmitResponse, QbitLinkError> {
        let url = format!("{}/v1/jobs", self.endpoint);
        let request = SamplerJobRequest {
            program_id: "sampler".to_string(),
            backend: backend.to_string(),
            hub: self.instance.clone(),
            params: SamplerParams {
                circuits: vec![circuit.to_qasm()],
                shots: Some(shots),
                // Let the service transpile for the chosen backend.
                skip_transpilation: Some(false),
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .map_err(request_failed)?;
        check(response, None)?.json().map_err(parse_failed)
    }

    pub fn get_job_status(&self, job_id: &str) -> Result<JobStatusResponse, QbitLinkError> {
        let url = job_url(&self.endpoint, job_id, None)?;
        let response = self.client.get(url).send().map_err(request_failed)?;
        check(response, Some(job_id))?.json().map_err(parse_failed)
    }

    pub fn get_job_results(&self, job_id: &str) -> Result<JobResultResponse, QbitLinkError> {
        let url = job_url(&self.endpoint, job_id, Some("results"))?;
        let response = self.client.get(url).send().map_err(request_failed)?;
        check(response, Some(job_id))?.json().map_err(parse_failed)
    }
}

/// `{endpoint}/v1/jobs/{job_id}[/{suffix}]` with `job_id` as one escaped
/// path segment.
///
/// Job ids come off the serial line, so `/`, `?` and `#` are percent-encoded
/// and the dot segments are refused.
fn job_url(endpoint: &str, job_id: &str, suffix: Option<&str>) -> Result<Url, QbitLinkError> {
    if matches!(job_id, "" | "." | "..") {
        return Err(QbitLinkError::Protocol(format!("Invalid job_id: {job_id:?}")));
    }
    let mut url = Url::parse(endpoint)
        .map_err(|e| QbitLinkError::Config(format!("Invalid endpoint {endpoint}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| QbitLinkError::Config(format!("Invalid endpoint {endpoint}: not a base URL")))?
        .pop_if_empty()
        .extend(["v1", "jobs"])
        .push(job_id)
        .extend(suffix);
    Ok(url)
}

fn request_failed(e: reqwest::Error) -> QbitLinkError {
    QbitLinkError::Provider(format!("IBM API request failed: {e}"))
}

fn parse_failed(e: reqwest::Error) -> QbitLinkError {
    QbitLinkError::Provider(format!("Failed to parse response: {e}"))
}

/// Map a non-success HTTP response to an error.
fn check(response: HttpResponse, job_id: Option<&str>) -> Result<HttpResponse, QbitLinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        if let Some(id) = job_id {
            return Err(QbitLinkError::JobNotFound(id.to_string()));
        }
    }
    let body = response.text().unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorResponse>(&body)
        .map(|e| e.message)
        .unwrap_or(body);
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(QbitLinkError::Provider(format!(
            "Authentication failed ({status}): {message}"
        )));
    }
    Err(QbitLinkError::Provider(format!(
        "IBM API returned {status}: {message}"
    )))
}

/// Least-loaded operational hardware backend.
pub fn select_least_busy(backends: &[BackendInfo]) -> Option<&BackendInfo> {
    backends
        .iter()
        .filter(|b| b.status.operational && !b.simulator)
        .min_by_key(|b| (b.status.pending_jobs.unwrap_or(u32::MAX), b.name.clone()))
}

/// Classical register width reported in the result metadata, if any.
fn result_clbits(result: &JobResultResponse) -> Option<usize> {
    result
        .results
        .first()?
        .metadata
        .as_ref()?
        .get("num_clbits")?
        .as_u64()
        .map(|w| w as usize)
}

/// Most frequent outcome of the first circuit, decoded to bits.
///
/// With one shot there is exactly one outcome. Ties pick the smallest
/// bitstring so the result is deterministic. Hex outcomes are padded to
/// `metadata.num_clbits`, else to `fallback_width`; with neither, leading
/// zeros cannot be recovered.
pub fn outcome_from_result(
    result: &JobResultResponse,
    fallback_width: Option<usize>,
) -> Result<Bits, QbitLinkError> {
    let counts = result
        .results
        .first()
        .and_then(|r| r.counts.as_ref())
        .ok_or_else(|| {
            QbitLinkError::Provider(format!("No measurement counts for job {}", result.id))
        })?;

    let (outcome, _) = counts
        .iter()
        .max_by(|(ka, ca), (kb, cb)| ca.cmp(cb).then_with(|| kb.cmp(ka)))
        .ok_or_else(|| QbitLinkError::Provider(format!("Empty counts for job {}", result.id)))?;

    Bits::from_bitstring(outcome, result_clbits(result).or(fallback_width))
}

// ============================================================================
// Provider
// ============================================================================

/// [`QuantumProvider`] backed by the IBM Quantum REST API.
///
/// The HTTP client is built on first use from the current credentials, so
/// installing a token never fails; a bad token surfaces on the next call.
pub struct IbmProvider {
    endpoint: String,
    instance: Option<String>,
    shots: u32,
    request_timeout: Duration,
    credentials: Option<Credentials>,
    client: Option<IbmClient>,
}

impl IbmProvider {
    pub fn from_config(config: &IbmConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            instance: config.instance.clone(),
            shots: config.shots,
            request_timeout: config.request_timeout,
            credentials: config.credentials.clone(),
            client: None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    fn client(&mut self) -> Result<&IbmClient, QbitLinkError> {
        if self.client.is_none() {
            let credentials = self.credentials.as_ref().ok_or(QbitLinkError::NotConfigured)?;
            let client = IbmClient::new(
                &self.endpoint,
                credentials,
                self.instance.clone(),
                self.request_timeout,
            )?;
            debug!("Created IBM client for {}", self.endpoint);
            self.client = Some(client);
        }
        self.client.as_ref().ok_or(QbitLinkError::NotConfigured)
    }
}

impl QuantumProvider for IbmProvider {
    fn configure(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
        self.client = None;
    }

    fn least_busy_backend(&mut self) -> Result<String, QbitLinkError> {
        let backends = self.client()?.list_backends()?;
        select_least_busy(&backends)
            .map(|b| b.name.clone())
            .ok_or_else(|| QbitLinkError::Provider("No operational hardware backend".into()))
    }

    fn submit(&mut self, backend: &str, circuit: &Circuit) -> Result<String, QbitLinkError> {
        let shots = self.shots;
        let response = self.client()?.submit_sampler_job(backend, circuit, shots)?;
        Ok(response.id)
    }

    fn job_status(&mut self, job_id: &str) -> Result<String, QbitLinkError> {
        Ok(self.client()?.get_job_status(job_id)?.status)
    }

    fn job_result(&mut self, job_id: &str) -> Result<Bits, QbitLinkError> {
        let client = self.client()?;
        let result = client.get_job_results(job_id)?;
        // Without metadata, recover the register width from the submitted circuit.
        let fallback = match result_clbits(&result) {
            Some(_) => None,
            None => match client.get_job_status(job_id) {
                Ok(job) => job.clbit_width(),
                Err(e) => {
                    debug!("No circuit width for job {job_id}: {e}");
                    None
                }
            },
        };
        outcome_from_result(&result, fallback)
    }
}

// ============================================================================
// Mock provider
// ============================================================================

/// A job held by [`MockProvider`].
#[derive(Debug, Clone)]
pub struct MockJob {
    pub backend: String,
    pub num_qubits: u32,
    /// Status labels returned by successive `job_status` calls; the last
    /// one repeats.
    pub statuses: Vec<String>,
    pub outcome: Option<Bits>,
}

/// In-memory provider for tests.
#[derive(Debug)]
pub struct MockProvider {
    pub credentials: Option<Credentials>,
    pub backends: Vec<BackendInfo>,
    pub jobs: HashMap<String, MockJob>,
    next_id: u32,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            credentials: Some(Credentials::new("mock-token")),
            backends: vec![
                BackendInfo::mock("ibm_brisbane", true, false, 12),
                BackendInfo::mock("ibm_kyiv", true, false, 3),
                BackendInfo::mock("ibm_sherbrooke", false, false, 0),
                BackendInfo::mock("simulator_stabilizer", true, true, 0),
            ],
            jobs: HashMap::new(),
            next_id: 0,
        }
    }
}

impl MockProvider {
    /// A provider with no token installed.
    pub fn unconfigured() -> Self {
        Self {
            credentials: None,
            ..Default::default()
        }
    }

    /// Register a finished job with the given outcome.
    pub fn with_job(mut self, job_id: &str, status: &str, outcome: &str) -> Self {
        let outcome = Bits::from_bitstring(outcome, None).ok();
        let num_qubits = outcome.as_ref().map_or(0, |b| b.len() as u32);
        self.jobs.insert(
            job_id.to_string(),
            MockJob {
                backend: "ibm_kyiv".into(),
                num_qubits,
                statuses: vec![status.to_string()],
                outcome,
            },
        );
        self
    }

    fn require_credentials(&self) -> Result<(), QbitLinkError> {
        self.credentials
            .as_ref()
            .map(|_| ())
            .ok_or(QbitLinkError::NotConfigured)
    }

    fn job_mut(&mut self, job_id: &str) -> Result<&mut MockJob, QbitLinkError> {
        self.jobs
            .get_mut(job_id)
            .ok_or_else(|| QbitLinkError::JobNotFound(job_id.to_string()))
    }
}

impl QuantumProvider for MockProvider {
    fn configure(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
    }

    fn least_busy_backend(&mut self) -> Result<String, QbitLinkError> {
        self.require_credentials()?;
        select_least_busy(&self.backends)
            .map(|b| b.name.clone())
            .ok_or_else(|| QbitLinkError::Provider("No operational hardware backend".into()))
    }

    fn submit(&mut self, backend: &str, circuit: &Circuit) -> Result<String, QbitLinkError> {
        self.require_credentials()?;
        self.next_id += 1;
        let job_id = format!("mock-job-{}", self.next_id);
        let outcome = Bits::new(vec![1; circuit.num_qubits() as usize]).ok();
        self.jobs.insert(
            job_id.clone(),
            MockJob {
                backend: backend.to_string(),
                num_qubits: circuit.num_qubits(),
                statuses: vec!["QUEUED".into(), "RUNNING".into(), "DONE".into()],
                outcome,
            },
        );
        Ok(job_id)
    }

    fn job_status(&mut self, job_id: &str) -> Result<String, QbitLinkError> {
        self.require_credentials()?;
        let job = self.job_mut(job_id)?;
        let status = if job.statuses.len() > 1 {
            job.statuses.remove(0)
        } else {
            job.statuses.first().cloned().unwrap_or_default()
        };
        Ok(status)
    }

    fn job_result(&mut self, job_id: &str) -> Result<Bits, QbitLinkError> {
        self.require_credentials()?;
        let job = self.job_mut(job_id)?;
        job.outcome
            .clone()
            .ok_or_else(|| QbitLinkError::Provider(format!("Job {job_id} has no result")))
    }
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Serialize)]
struct SamplerJobRequest {
    program_id: String,
    backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hub: Option<String>,
    params: SamplerParams,
}

#[derive(Debug, Serialize)]
struct SamplerParams {
    circuits: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    shots: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skip_transpilation: Option<bool>,
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    message: String,
}

#[derive(Debug, Deserialize)]
struct BackendsResponse {
    backends: Vec<BackendInfo>,
}

/// Backend listing entry.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendInfo {
    pub name: String,
    #[serde(default)]
    pub num_qubits: usize,
    pub status: BackendStatus,
    #[serde(default)]
    pub simulator: bool,
}

impl BackendInfo {
    fn mock(name: &str, operational: bool, simulator: bool, pending_jobs: u32) -> Self {
        Self {
            name: name.to_string(),
            num_qubits: 127,
            status: BackendStatus {
                operational,
                pending_jobs: Some(pending_jobs),
            },
            simulator,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendStatus {
    pub operational: bool,
    #[serde(default)]
    pub pending_jobs: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusResponse {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub backend: Option<String>,
    /// Submitted program parameters, echoed back by the service.
    #[serde(default)]
    pub params: Option<JobParams>,
}

impl JobStatusResponse {
    /// Classical bits declared by the first submitted circuit.
    pub fn clbit_width(&self) -> Option<usize> {
        let qasm = self.params.as_ref()?.circuits.first()?;
        qasm_clbit_width(qasm)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobParams {
    #[serde(default)]
    pub circuits: Vec<String>,
}

/// Sum of the `bit[N]` declarations in an OpenQASM 3 program.
fn qasm_clbit_width(qasm: &str) -> Option<usize> {
    let widths: Vec<usize> = qasm
        .lines()
        .filter_map(|line| line.trim().strip_prefix("bit["))
        .filter_map(|rest| rest.split(']').next()?.trim().parse().ok())
        .collect();
    (!widths.is_empty()).then(|| widths.iter().sum())
}

#[derive(Debug, Deserialize)]
pub struct JobResultResponse {
    pub id: String,
    pub results: Vec<SamplerResult>,
}

/// Sampler output for one circuit.
#[derive(Debug, Deserialize)]
pub struct SamplerResult {
    /// Measurement counts (bitstring -> count).
    #[serde(default)]
    pub counts: Option<HashMap<String, u64>>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with_counts(pairs: &[(&str, u64)], metadata: Option<serde_json::Value>) -> JobResultResponse {
        JobResultResponse {
            id: "job-1".into(),
            results: vec![SamplerResult {
                counts: Some(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()),
                metadata,
            }],
        }
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = Credentials::new("super-secret");
        let text = format!("{creds:?}");
        assert!(!text.contains("super-secret"));
        assert!(text.contains("REDACTED"));
    }

    #[test]
    fn status_classification() {
        assert!(is_pending("QUEUED"));
        assert!(is_pending("Running"));
        assert!(!is_pending("DONE"));
        assert!(is_completed("Completed"));
        assert!(!is_completed("Failed"));
    }

    #[test]
    fn least_busy_skips_simulators_and_offline() {
        let backends = MockProvider::default().backends;
        let best = select_least_busy(&backends).unwrap();
        assert_eq!(best.name, "ibm_kyiv");
    }

    #[test]
    fn least_busy_none_when_nothing_operational() {
        let backends = vec![
            BackendInfo::mock("a", false, false, 0),
            BackendInfo::mock("sim", true, true, 0),
        ];
        assert!(select_least_busy(&backends).is_none());
    }

    #[test]
    fn backend_listing_deserializes() {
        let json = r#"{"backends": [
            {"name": "ibm_kyiv", "num_qubits": 127, "status": {"operational": true, "pending_jobs": 4}},
            {"name": "sim", "status": {"operational": true}, "simulator": true}
        ]}"#;
        let parsed: BackendsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.backends.len(), 2);
        assert_eq!(parsed.backends[0].status.pending_jobs, Some(4));
        assert!(parsed.backends[1].simulator);
    }

    #[test]
    fn outcome_single_shot() {
        let result = result_with_counts(&[("10", 1)], None);
        assert_eq!(outcome_from_result(&result, None).unwrap().as_slice(), &[1, 0]);
    }

    #[test]
    fn outcome_picks_most_frequent() {
        let result = result_with_counts(&[("00", 3), ("11", 7), ("01", 7)], None);
        assert_eq!(outcome_from_result(&result, None).unwrap().as_slice(), &[0, 1]);
    }

    #[test]
    fn outcome_hex_uses_clbit_width() {
        let meta = serde_json::json!({"num_clbits": 3});
        let result = result_with_counts(&[("0x1", 1)], Some(meta));
        assert_eq!(outcome_from_result(&result, None).unwrap().as_slice(), &[0, 0, 1]);
    }

    #[test]
    fn outcome_hex_without_metadata_uses_fallback_width() {
        let result = result_with_counts(&[("0x1", 1)], None);
        assert_eq!(outcome_from_result(&result, Some(2)).unwrap().as_slice(), &[0, 1]);
        assert_eq!(outcome_from_result(&result, None).unwrap().as_slice(), &[1]);
    }

    #[test]
    fn outcome_metadata_width_wins_over_fallback() {
        let meta = serde_json::json!({"num_clbits": 3});
        let result = result_with_counts(&[("0x1", 1)], Some(meta));
        assert_eq!(outcome_from_result(&result, Some(5)).unwrap().as_slice(), &[0, 0, 1]);
    }

    #[test]
    fn job_status_recovers_circuit_width() {
        let qasm = Circuit::superposition(2).unwrap().to_qasm();
        let json = serde_json::json!({
            "id": "job-1",
            "status": "Completed",
            "params": {"circuits": [qasm]}
        });
        let job: JobStatusResponse = serde_json::from_value(json).unwrap();
        assert_eq!(job.clbit_width(), Some(2));

        let bare: JobStatusResponse =
            serde_json::from_str(r#"{"id": "job-1", "status": "Queued"}"#).unwrap();
        assert_eq!(bare.clbit_width(), None);
    }

    #[test]
    fn qasm_width_sums_registers() {
        assert_eq!(qasm_clbit_width("bit[2] a;\nbit[3] b;\n"), Some(5));
        assert_eq!(qasm_clbit_width("qubit[2] q;\n"), None);
    }

    #[test]
    fn job_url_escapes_job_id() {
        let url = job_url(DEFAULT_ENDPOINT, "abc123", None).unwrap();
        assert_eq!(url.as_str(), "https://api.quantum-computing.ibm.com/v1/jobs/abc123");

        let url = job_url("https://example.com/api/", "abc123", Some("results")).unwrap();
        assert_eq!(url.as_str(), "https://example.com/api/v1/jobs/abc123/results");

        let url = job_url(DEFAULT_ENDPOINT, "../backends", None).unwrap();
        assert_eq!(url.path(), "/v1/jobs/..%2Fbackends");

        let url = job_url(DEFAULT_ENDPOINT, "x?y#z", Some("results")).unwrap();
        assert_eq!(url.path(), "/v1/jobs/x%3Fy%23z/results");
        assert!(url.query().is_none());
    }

    #[test]
    fn job_url_rejects_dot_segments() {
        for id in ["", ".", ".."] {
            assert!(matches!(
                job_url(DEFAULT_ENDPOINT, id, None),
                Err(QbitLinkError::Protocol(_))
            ));
        }
    }

    #[test]
    fn outcome_missing_counts_is_error() {
        let result = JobResultResponse {
            id: "job-1".into(),
            results: vec![],
        };
        assert!(matches!(outcome_from_result(&result, None), Err(QbitLinkError::Provider(_))));
    }

    #[test]
    fn sampler_request_serialization() {
        let request = SamplerJobRequest {
            program_id: "sampler".into(),
            backend: "ibm_kyiv".into(),
            hub: None,
            params: SamplerParams {
                circuits: vec![Circuit::superposition(1).unwrap().to_qasm()],
                shots: Some(1),
                skip_transpilation: Some(false),
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["program_id"], "sampler");
        assert_eq!(json["params"]["shots"], 1);
        assert!(json.get("hub").is_none());
    }

    #[test]
    fn unconfigured_provider_refuses_calls() {
        let mut provider = IbmProvider::from_config(&IbmConfig::default());
        assert!(!provider.is_configured());
        assert!(matches!(
            provider.job_status("abc"),
            Err(QbitLinkError::NotConfigured)
        ));
        provider.configure(Credentials::new("token"));
        assert!(provider.is_configured());
    }

    #[test]
    fn mock_submit_then_wait() {
        let mut provider = MockProvider::default();
        let circuit = Circuit::superposition(2).unwrap();
        let job_id = provider.submit_to_least_busy(&circuit).unwrap();
        assert_eq!(provider.jobs[&job_id].backend, "ibm_kyiv");

        let status = wait_for_job(&mut provider, &job_id, Duration::ZERO, None).unwrap();
        assert_eq!(status, "DONE");
        assert_eq!(provider.job_result(&job_id).unwrap().as_slice(), &[1, 1]);
    }

    #[test]
    fn wait_reports_failed_job() {
        let mut provider = MockProvider::default().with_job("bad", "ERROR", "");
        let err = wait_for_job(&mut provider, "bad", Duration::ZERO, None).unwrap_err();
        assert!(matches!(err, QbitLinkError::Provider(_)));
    }

    #[test]
    fn wait_times_out_on_stuck_job() {
        let mut provider = MockProvider::default().with_job("stuck", "QUEUED", "0");
        let err = wait_for_job(
            &mut provider,
            "stuck",
            Duration::from_millis(1),
            Some(Duration::from_millis(5)),
        )
        .unwrap_err();
        assert!(err.to_string().contains("still QUEUED"));
    }

    #[test]
    fn mock_unknown_job() {
        let mut provider = MockProvider::default();
        assert!(matches!(
            provider.job_status("nope"),
            Err(QbitLinkError::JobNotFound(_))
        ));
        assert!(matches!(
            provider.job_result("nope"),
            Err(QbitLinkError::JobNotFound(_))
        ));
    }
}
