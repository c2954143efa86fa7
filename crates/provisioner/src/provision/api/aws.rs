//! [`ResourceApi`] backed by the `aws ec2` command line tool.
use std::path::PathBuf;
use std::process::Output;
use std::rc::Rc;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bstr::ByteSlice;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::process::Command;

use crate::provision::api::{
    ApiError, ApiFuture, ApiResult, ProvisionalRequestId, ResourceApi, ResourceDescription,
    ResourceId,
};
use crate::provision::spec::{ResourceSpec, Tags};

/// Device name of the root volume.
const ROOT_DEVICE_NAME: &str = "/dev/sda1";

pub const DEFAULT_REGION: &str = "us-east-1";

/// Message of the `aws ec2 wait` waiter when it gives up polling on its own.
const WAITER_GAVE_UP: &str = "Max attempts exceeded";

/// Ceiling of a single fulfilment or readiness wait.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
pub struct AwsCliConfig {
    /// Path to (or name of) the `aws` executable.
    pub program: PathBuf,
    pub region: String,
    pub wait_timeout: Duration,
}

impl Default for AwsCliConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("aws"),
            region: DEFAULT_REGION.to_string(),
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

pub struct AwsCliClient {
    config: Rc<AwsCliConfig>,
}

impl AwsCliClient {
    pub fn new(config: AwsCliConfig) -> Self {
        Self {
            config: Rc::new(config),
        }
    }
}

impl ResourceApi for AwsCliClient {
    fn check_access(&self) -> ApiFuture<()> {
        let config = self.config.clone();
        Box::pin(async move {
            run_ec2(&config, "describe-regions", vec![]).await?;
            Ok(())
        })
    }

    fn allocate_guaranteed(&self, spec: &ResourceSpec, tags: &Tags) -> ApiFuture<ResourceId> {
        let config = self.config.clone();
        let args = build_run_instances_args(spec, tags);
        Box::pin(async move {
            let output = run_ec2(&config, "run-instances", args).await?;
            let response: RunInstancesResponse = parse_response("run-instances", &output)?;
            response
                .instances
                .into_iter()
                .next()
                .map(|instance| instance.instance_id)
                .ok_or_else(|| ApiError::invalid_response("run-instances", "no instance returned"))
        })
    }

    fn allocate_provisional(
        &self,
        spec: &ResourceSpec,
        max_price: Option<&str>,
    ) -> ApiFuture<ProvisionalRequestId> {
        let config = self.config.clone();
        let mut args = vec![
            "--type".to_string(),
            "one-time".to_string(),
            "--launch-specification".to_string(),
            build_launch_specification(spec).to_string(),
        ];
        if let Some(price) = max_price {
            args.push("--spot-price".to_string());
            args.push(price.to_string());
        }
        Box::pin(async move {
            let output = run_ec2(&config, "request-spot-instances", args).await?;
            let response: SpotRequestsResponse =
                parse_response("request-spot-instances", &output)?;
            response
                .spot_instance_requests
                .into_iter()
                .next()
                .map(|request| request.spot_instance_request_id)
                .ok_or_else(|| {
                    ApiError::invalid_response("request-spot-instances", "no request returned")
                })
        })
    }

    fn await_fulfilled(&self, request: &ProvisionalRequestId) -> ApiFuture<ResourceId> {
        let config = self.config.clone();
        let request = request.clone();
        Box::pin(async move {
            let id_args = vec!["--spot-instance-request-ids".to_string(), request.clone()];
            wait_for(
                &config,
                "spot-instance-request-fulfilled",
                &request,
                id_args.clone(),
            )
            .await?;

            let output = run_ec2(&config, "describe-spot-instance-requests", id_args).await?;
            let response: SpotRequestsResponse =
                parse_response("describe-spot-instance-requests", &output)?;
            response
                .spot_instance_requests
                .into_iter()
                .next()
                .and_then(|request| request.instance_id)
                .ok_or_else(|| {
                    ApiError::invalid_response(
                        "describe-spot-instance-requests",
                        format!("fulfilled request {request} has no instance"),
                    )
                })
        })
    }

    fn await_ready(&self, resource: &ResourceId) -> ApiFuture<()> {
        let config = self.config.clone();
        let resource = resource.clone();
        Box::pin(async move {
            let args = vec!["--instance-ids".to_string(), resource.clone()];
            wait_for(&config, "instance-running", &resource, args).await
        })
    }

    fn cancel_provisional(&self, request: &ProvisionalRequestId) -> ApiFuture<()> {
        let config = self.config.clone();
        let args = vec!["--spot-instance-request-ids".to_string(), request.clone()];
        Box::pin(async move {
            run_ec2(&config, "cancel-spot-instance-requests", args).await?;
            Ok(())
        })
    }

    fn tag(&self, resources: &[String], tags: &Tags) -> ApiFuture<()> {
        let config = self.config.clone();
        let mut args = vec!["--resources".to_string()];
        args.extend(resources.iter().cloned());
        args.push("--tags".to_string());
        args.push(tags_to_json(tags).to_string());
        Box::pin(async move {
            run_ec2(&config, "create-tags", args).await?;
            Ok(())
        })
    }

    fn describe(&self, resource: &ResourceId) -> ApiFuture<ResourceDescription> {
        let config = self.config.clone();
        let resource = resource.clone();
        Box::pin(async move {
            let args = vec!["--instance-ids".to_string(), resource.clone()];
            let output = run_ec2(&config, "describe-instances", args).await?;
            let response: DescribeInstancesResponse =
                parse_response("describe-instances", &output)?;
            response
                .reservations
                .into_iter()
                .flat_map(|reservation| reservation.instances)
                .find(|instance| instance.instance_id == resource)
                .map(ResourceDescription::from)
                .ok_or_else(|| {
                    ApiError::invalid_response(
                        "describe-instances",
                        format!("instance {resource} not found"),
                    )
                })
        })
    }

    fn terminate(&self, resource: &ResourceId) -> ApiFuture<()> {
        let config = self.config.clone();
        let args = vec!["--instance-ids".to_string(), resource.clone()];
        Box::pin(async move {
            run_ec2(&config, "terminate-instances", args).await?;
            Ok(())
        })
    }
}

/// Runs `aws ec2 <operation> <args>` and returns its standard output.
async fn run_ec2(
    config: &AwsCliConfig,
    operation: &'static str,
    args: Vec<String>,
) -> ApiResult<String> {
    let mut command = Command::new(&config.program);
    command
        .arg("ec2")
        .arg(operation)
        .args(&args)
        .args(["--region", config.region.as_str(), "--output", "json"])
        .kill_on_drop(true);

    log::debug!(
        "Running command `{} ec2 {operation} {}`",
        config.program.display(),
        args.join(" ")
    );
    let output = command
        .output()
        .await
        .map_err(|error| ApiError::request(operation, format!("cannot start aws: {error}")))?;
    let output =
        check_command_output(output).map_err(|message| ApiError::request(operation, message))?;
    Ok(output.stdout.to_str_lossy().trim().to_string())
}

/// Runs `aws ec2 wait <condition>`, bounded by the configured wait timeout.
async fn wait_for(
    config: &AwsCliConfig,
    condition: &'static str,
    id: &str,
    args: Vec<String>,
) -> ApiResult<()> {
    let mut wait_args = vec![condition.to_string()];
    wait_args.extend(args);
    let start = Instant::now();
    match tokio::time::timeout(config.wait_timeout, run_ec2(config, "wait", wait_args)).await {
        Ok(result) => result
            .map(|_| ())
            .map_err(|error| waiter_error(error, condition, id, start.elapsed())),
        Err(_) => Err(ApiError::Timeout {
            condition,
            id: id.to_string(),
            after: config.wait_timeout,
        }),
    }
}

/// The waiter polls a limited number of times and may give up before our own ceiling is reached.
fn waiter_error(error: ApiError, condition: &'static str, id: &str, elapsed: Duration) -> ApiError {
    match error {
        ApiError::Request { ref message, .. } if message.contains(WAITER_GAVE_UP) => {
            ApiError::Timeout {
                condition,
                id: id.to_string(),
                after: Duration::from_secs(elapsed.as_secs()),
            }
        }
        error => error,
    }
}

fn check_command_output(output: Output) -> Result<Output, String> {
    let status = output.status;
    if !status.success() {
        return Err(format!(
            "Exit code: {}\nStderr: {}\nStdout: {}",
            status.code().unwrap_or(-1),
            output.stderr.to_str_lossy().trim(),
            output.stdout.to_str_lossy().trim()
        ));
    }
    Ok(output)
}

fn parse_response<T: DeserializeOwned>(operation: &'static str, output: &str) -> ApiResult<T> {
    serde_json::from_str(output)
        .map_err(|error| ApiError::invalid_response(operation, error.to_string()))
}

fn block_device_mappings(spec: &ResourceSpec) -> serde_json::Value {
    json!([{
        "DeviceName": ROOT_DEVICE_NAME,
        "Ebs": {
            "VolumeSize": spec.volume.size_gb,
            "VolumeType": spec.volume.class,
            "DeleteOnTermination": true,
            "Encrypted": true,
        }
    }])
}

fn tags_to_json(tags: &Tags) -> serde_json::Value {
    tags.iter()
        .map(|(key, value)| json!({"Key": key, "Value": value}))
        .collect()
}

fn build_run_instances_args(spec: &ResourceSpec, tags: &Tags) -> Vec<String> {
    let mut args = vec![
        "--count".to_string(),
        "1".to_string(),
        "--instance-type".to_string(),
        spec.kind.clone(),
        "--block-device-mappings".to_string(),
        block_device_mappings(spec).to_string(),
        "--tag-specifications".to_string(),
        json!([{"ResourceType": "instance", "Tags": tags_to_json(tags)}]).to_string(),
    ];
    if let Some(image) = &spec.image {
        args.extend(["--image-id".to_string(), image.clone()]);
    }
    if let Some(key_name) = &spec.key_name {
        args.extend(["--key-name".to_string(), key_name.clone()]);
    }
    if !spec.security_groups.is_empty() {
        args.push("--security-group-ids".to_string());
        args.extend(spec.security_groups.iter().cloned());
    }
    if let Some(subnet) = &spec.subnet {
        args.extend(["--subnet-id".to_string(), subnet.clone()]);
    }
    // The CLI encodes `--user-data` on its own
    if let Some(user_data) = &spec.user_data {
        args.extend(["--user-data".to_string(), user_data.clone()]);
    }
    if let Some(profile) = &spec.instance_profile {
        args.extend(["--iam-instance-profile".to_string(), format!("Name={profile}")]);
    }
    args
}

/// Launch specification of a spot request. Tags cannot be attached here.
fn build_launch_specification(spec: &ResourceSpec) -> serde_json::Value {
    let mut launch = json!({
        "InstanceType": spec.kind,
        "BlockDeviceMappings": block_device_mappings(spec),
    });
    if let Some(image) = &spec.image {
        launch["ImageId"] = json!(image);
    }
    if let Some(key_name) = &spec.key_name {
        launch["KeyName"] = json!(key_name);
    }
    if !spec.security_groups.is_empty() {
        launch["SecurityGroupIds"] = json!(spec.security_groups);
    }
    if let Some(subnet) = &spec.subnet {
        launch["SubnetId"] = json!(subnet);
    }
    if let Some(user_data) = &spec.user_data {
        launch["UserData"] = json!(STANDARD.encode(user_data.as_bytes()));
    }
    if let Some(profile) = &spec.instance_profile {
        launch["IamInstanceProfile"] = json!({"Name": profile});
    }
    launch
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RunInstancesResponse {
    instances: Vec<InstanceRef>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceRef {
    instance_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SpotRequestsResponse {
    spot_instance_requests: Vec<SpotRequest>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SpotRequest {
    spot_instance_request_id: String,
    instance_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesResponse {
    reservations: Vec<Reservation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    instances: Vec<Instance>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Instance {
    instance_id: String,
    public_ip_address: Option<String>,
    private_ip_address: Option<String>,
    state: InstanceState,
    #[serde(default)]
    block_device_mappings: Vec<BlockDeviceMapping>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceState {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlockDeviceMapping {
    ebs: Option<EbsDevice>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EbsDevice {
    volume_id: String,
}

impl From<Instance> for ResourceDescription {
    fn from(instance: Instance) -> Self {
        Self {
            public_address: instance.public_ip_address,
            private_address: instance.private_ip_address,
            lifecycle_state: instance.state.name,
            volume_ids: instance
                .block_device_mappings
                .into_iter()
                .filter_map(|mapping| mapping.ebs.map(|ebs| ebs.volume_id))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::time::Duration;

    use crate::provision::api::aws::{
        AwsCliClient, AwsCliConfig, DescribeInstancesResponse, ResourceDescription,
        build_launch_specification, build_run_instances_args, parse_response, waiter_error,
    };
    use crate::provision::api::{ApiError, ResourceApi};
    use crate::provision::spec::ResourceSpec;

    #[test]
    fn waiter_giving_up_is_a_timeout() {
        let error = ApiError::request(
            "wait",
            "Exit code: 255\nStderr: Waiter InstanceRunning failed: Max attempts exceeded\nStdout:",
        );
        assert_eq!(
            waiter_error(error, "instance-running", "i-1", Duration::from_millis(600_400)),
            ApiError::Timeout {
                condition: "instance-running",
                id: "i-1".to_string(),
                after: Duration::from_secs(600),
            }
        );
    }

    #[test]
    fn other_waiter_failures_are_kept() {
        let error = ApiError::request(
            "wait",
            "Exit code: 255\nStderr: Waiter InstanceRunning failed: Waiter encountered a terminal failure state",
        );
        assert_eq!(
            waiter_error(error.clone(), "instance-running", "i-1", Duration::from_secs(5)),
            error
        );
    }

    fn full_spec() -> ResourceSpec {
        let mut spec = ResourceSpec::new("t3.micro").with_name("web");
        spec.image = Some("ami-1".to_string());
        spec.key_name = Some("deploy".to_string());
        spec.security_groups = vec!["sg-1".to_string(), "sg-2".to_string()];
        spec.subnet = Some("subnet-1".to_string());
        spec.user_data = Some("#!/bin/sh\necho hi".to_string());
        spec.instance_profile = Some("worker".to_string());
        spec
    }

    #[test]
    fn launch_specification_encodes_user_data() {
        let launch = build_launch_specification(&full_spec());
        assert_eq!(launch["ImageId"], "ami-1");
        assert_eq!(launch["InstanceType"], "t3.micro");
        assert_eq!(launch["UserData"], "IyEvYmluL3NoCmVjaG8gaGk=");
        assert_eq!(launch["IamInstanceProfile"]["Name"], "worker");
        assert_eq!(launch["SecurityGroupIds"][1], "sg-2");
        assert_eq!(launch["BlockDeviceMappings"][0]["Ebs"]["VolumeSize"], 8);
        assert_eq!(launch["BlockDeviceMappings"][0]["Ebs"]["Encrypted"], true);
        assert!(launch.get("TagSpecifications").is_none());
    }

    #[test]
    fn launch_specification_skips_unset_fields() {
        let launch = build_launch_specification(&ResourceSpec::new("t3.micro"));
        assert!(launch.get("KeyName").is_none());
        assert!(launch.get("SubnetId").is_none());
        assert!(launch.get("UserData").is_none());
    }

    #[test]
    fn run_instances_attach_tags() {
        let tags = BTreeMap::from([("Name".to_string(), "web".to_string())]);
        let args = build_run_instances_args(&full_spec(), &tags);
        let position = args
            .iter()
            .position(|arg| arg == "--tag-specifications")
            .unwrap();
        assert_eq!(
            args[position + 1],
            r#"[{"ResourceType":"instance","Tags":[{"Key":"Name","Value":"web"}]}]"#
        );
        let position = args
            .iter()
            .position(|arg| arg == "--security-group-ids")
            .unwrap();
        assert_eq!(args[position + 1..position + 3], ["sg-1", "sg-2"]);
    }

    #[test]
    fn parse_describe_instances() {
        let output = r#"{"Reservations": [{"Instances": [{
            "InstanceId": "i-1",
            "PublicIpAddress": "1.2.3.4",
            "PrivateIpAddress": "10.0.0.1",
            "State": {"Code": 16, "Name": "running"},
            "BlockDeviceMappings": [
                {"DeviceName": "/dev/sda1", "Ebs": {"VolumeId": "vol-1"}},
                {"DeviceName": "/dev/sdb"}
            ]
        }]}]}"#;
        let response: DescribeInstancesResponse =
            parse_response("describe-instances", output).unwrap();
        let instance = response.reservations.into_iter().next().unwrap();
        let description =
            ResourceDescription::from(instance.instances.into_iter().next().unwrap());
        assert_eq!(description.public_address.as_deref(), Some("1.2.3.4"));
        assert_eq!(description.lifecycle_state, "running");
        assert_eq!(description.volume_ids, vec!["vol-1".to_string()]);
    }

    #[test]
    fn parse_invalid_response() {
        let result: Result<DescribeInstancesResponse, _> =
            parse_response("describe-instances", "not json");
        assert!(matches!(
            result,
            Err(ApiError::InvalidResponse {
                operation: "describe-instances",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn missing_program_is_request_error() {
        let client = AwsCliClient::new(AwsCliConfig {
            program: PathBuf::from("/nonexistent/aws-binary"),
            region: "eu-west-1".to_string(),
            wait_timeout: Duration::from_secs(1),
        });
        let result = client.terminate(&"i-1".to_string()).await;
        assert!(matches!(
            result,
            Err(ApiError::Request {
                operation: "terminate-instances",
                ..
            })
        ));
    }
}
