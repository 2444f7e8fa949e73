mod report;

pub use report::{
    JIRA_LINK_LABEL, JIRA_NAME_LABEL, Priority, Report, Step, Tags, Test, TestCase,
    ValidationError,
};
