//! ecscout-discovery - Prometheus service discovery for Amazon ECS.
//!
//! Polls an ECS cluster for running tasks, matches containers against
//! operator rules (service name, task definition ARN, docker label),
//! resolves container ports to host addresses per network mode and
//! publishes the scrape targets as a Prometheus file_sd YAML document,
//! written atomically.
//!
//! The orchestrator API sits behind the [`Fetcher`] trait; everything else
//! is the matching and export pipeline driven by [`ServiceDiscovery`].

mod config;
pub use config::{
    AWS_REGION_ENV_KEY, Config, DEFAULT_JOB_LABEL_NAME, DEFAULT_REFRESH_INTERVAL,
    DEFAULT_RESULT_FILE,
};

mod error;
pub use error::Errors;

mod task;
pub use task::{
    Attachment, AttachmentDetail, ContainerDefinition, ENI_ATTACHMENT_TYPE, Ec2Instance,
    ExportError, NetworkBinding, NetworkMode, PRIVATE_IPV4_DETAIL, PortMapping, RuntimeContainer,
    Service, Task, TaskDefinition,
};

mod matcher;
pub use matcher::{
    CommonExporterConfig, DEFAULT_METRICS_PATH, MatchError, MatchOutcome, MatchResult,
    MatchedContainer, MatchedTarget, Matcher, MatcherType, match_containers,
};

mod service;
pub use service::{ServiceConfig, ServiceMatcher, ServiceNameFilter, service_configs_to_filter};

mod task_definition;
pub use task_definition::{TaskDefinitionConfig, TaskDefinitionMatcher};

mod docker_label;
pub use docker_label::{DockerLabelConfig, DockerLabelMatcher};

mod filter;
pub use filter::TaskFilter;

mod exporter;
pub use exporter::TaskExporter;

mod target;
pub use target::{
    METRICS_PATH_LABEL, PrometheusTarget, TargetGroup, sanitize_label, targets_to_file_sd,
    targets_to_file_sd_yaml,
};

mod writer;
pub use writer::write_file_atomic;

mod fetcher;
pub use fetcher::{Fetcher, SnapshotFetcher, StaticFetcher};

mod sd;
pub use sd::ServiceDiscovery;
