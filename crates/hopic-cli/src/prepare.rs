//! `prepare-source-tree`: CLI-argument adapter over
//! `hopic_core::prepare_source_tree`'s three sub-modes.

use anyhow::Result;
use hopic_core::{GitIdentity, MergeChangeRequestOptions, PrepareIdentity, PrepareMode, PrepareOutcome};

use crate::workspace::LoadedConfig;

pub struct IdentityArgs {
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub author_date: Option<String>,
    pub commit_date: Option<String>,
}

pub enum SubMode {
    MergeChangeRequest {
        source_remote: String,
        source_ref: String,
        change_request: Option<String>,
        title: Option<String>,
        description: Option<String>,
        approved_by: Vec<String>,
    },
    ApplyModalityChange { name: String },
    BumpVersion,
}

pub fn run(
    loaded: &LoadedConfig,
    target_ref: &str,
    identity_args: &IdentityArgs,
    submode: SubMode,
    hopic_version: &str,
) -> Result<PrepareOutcome> {
    let identity = PrepareIdentity {
        author: Some(GitIdentity {
            name: identity_args.author_name.clone(),
            email: identity_args.author_email.clone(),
            date: identity_args.author_date.clone(),
        }),
        committer: Some(GitIdentity { name: None, email: None, date: identity_args.commit_date.clone() }),
    };

    let mode = match submode {
        SubMode::MergeChangeRequest { source_remote, source_ref, change_request, title, description, approved_by } => {
            PrepareMode::MergeChangeRequest(MergeChangeRequestOptions {
                source_remote,
                source_ref,
                change_request,
                title,
                description,
                approved_by,
            })
        }
        SubMode::ApplyModalityChange { name } => PrepareMode::ApplyModalityChange { name },
        SubMode::BumpVersion => PrepareMode::BumpVersion,
    };

    let vars = crate::vars::base_vars(&loaded.workspace, &[]);
    hopic_core::prepare_source_tree(&loaded.workspace, &loaded.config, target_ref, mode, &identity, &vars, hopic_version)
}
