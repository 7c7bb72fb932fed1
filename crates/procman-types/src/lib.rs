use serde::{Deserialize, Serialize};

/// Schedule literal that requests an automatic Start when the daemon boots.
pub const REBOOT_SCHEDULE: &str = "reboot";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Continuous,
    OneTime,
}

impl JobType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Continuous => "continuous",
            JobType::OneTime => "one_time",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<JobType> {
        match s {
            "continuous" => Some(JobType::Continuous),
            "one_time" => Some(JobType::OneTime),
            _ => None,
        }
    }
}

/// Declarative specification of a job: what to run and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub name: String,
    pub command: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub schedule: String,
}

impl JobDescriptor {
    /// Splits `command` on single ASCII spaces: the first token is the
    /// executable, the rest are its arguments. No quoting or escaping;
    /// consecutive spaces produce empty tokens.
    #[must_use]
    pub fn command_tokens(&self) -> Vec<&str> {
        self.command.split(' ').collect()
    }

    #[must_use]
    pub fn autostarts_on_boot(&self) -> bool {
        self.schedule == REBOOT_SCHEDULE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Stopped,
    Starting,
    Running,
    Retrying,
    Error,
    Stopping,
    Exited,
    Unknown,
}

impl JobState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Stopped => "stopped",
            JobState::Starting => "starting",
            JobState::Running => "running",
            JobState::Retrying => "retrying",
            JobState::Error => "error",
            JobState::Stopping => "stopping",
            JobState::Exited => "exited",
            JobState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    Start,
    Stop,
    Restart,
}

/// One lifecycle command addressed to the supervisor owning `job_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleCommand {
    pub job_name: String,
    pub verb: Verb,
}

impl LifecycleCommand {
    #[must_use]
    pub fn new(job_name: impl Into<String>, verb: Verb) -> Self {
        Self {
            job_name: job_name.into(),
            verb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_json_round_trip() {
        let json = r#"{"name":"echo","command":"/bin/echo hi","type":"one_time","schedule":""}"#;
        let d: JobDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.name, "echo");
        assert_eq!(d.job_type, JobType::OneTime);
        assert_eq!(serde_json::to_string(&d).unwrap(), json);
    }

    #[test]
    fn command_tokens_split_on_single_spaces() {
        let d = JobDescriptor {
            name: "j".into(),
            command: "/bin/echo hello  world".into(),
            job_type: JobType::OneTime,
            schedule: String::new(),
        };
        assert_eq!(d.command_tokens(), vec!["/bin/echo", "hello", "", "world"]);
    }

    #[test]
    fn state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobState::Retrying).unwrap(),
            "\"retrying\""
        );
        assert_eq!(JobState::Stopped.to_string(), "stopped");
    }

    #[test]
    fn reboot_schedule_detected() {
        let mut d = JobDescriptor {
            name: "j".into(),
            command: "/bin/true".into(),
            job_type: JobType::Continuous,
            schedule: "reboot".into(),
        };
        assert!(d.autostarts_on_boot());
        d.schedule = "@reboot".into();
        assert!(!d.autostarts_on_boot());
    }
}
