//! Policy check
//!
//! Loads the same inputs as `serve`, validates every root and prints the
//! effective policy. With `--path`, also reports whether each given path
//! would be authorized and why not.

use super::{policy_error, PolicyArgs};
use anyhow::{bail, Context, Result};
use clap::Args;
use fsgate_mcp::security::{AccessKind, Authorizer, EntryKind};

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Path to test against the policy (repeatable)
    #[arg(long = "path")]
    pub paths: Vec<String>,
}

pub fn run(args: CheckArgs) -> Result<()> {
    let config = args.policy.load_config()?;
    let authorizer = config.build_authorizer().map_err(policy_error)?;

    print!("{}", describe_policy(&authorizer));

    if args.paths.is_empty() {
        println!("Policy OK");
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;

    let mut refused = 0;
    for raw in &args.paths {
        let verdict = runtime.block_on(check_path(&authorizer, raw));
        if verdict.starts_with("DENIED") {
            refused += 1;
        }
        println!("{}", verdict);
    }

    if refused > 0 {
        bail!("{} of {} paths refused", refused, args.paths.len());
    }
    Ok(())
}

fn describe_policy(authorizer: &Authorizer) -> String {
    let policy = authorizer.policy();
    let mut out = String::from("Allowed:\n");
    for root in policy.allowed() {
        out.push_str(&format!("  {}\n", root.display()));
    }

    out.push_str("Denied:\n");
    if policy.denied().is_empty() {
        out.push_str("  (none)\n");
    }
    for root in policy.denied() {
        out.push_str(&format!("  {}\n", root.display()));
    }

    out.push_str(&format!(
        "Base directory: {}\n",
        authorizer.canonicalizer().base_dir().display()
    ));
    out
}

/// One line: `ALLOWED <path> (<kind>)` or `DENIED <raw>: <reason>`
async fn check_path(authorizer: &Authorizer, raw: &str) -> String {
    let kind = match authorizer.canonicalizer().canonicalize(raw).await {
        Ok(path) if path.kind() == EntryKind::Directory => AccessKind::Directory,
        Ok(_) => AccessKind::File,
        Err(e) => return format!("DENIED {}: {}", raw, e),
    };

    match authorizer.authorize(raw, kind).await {
        Ok(authorized) => match authorized.sniff {
            Some(sniff) => format!("ALLOWED {} (file, {})", authorized.path, sniff.mime_type),
            None => format!("ALLOWED {} (directory)", authorized.path),
        },
        Err(e) => format!("DENIED {}: {}", raw, e),
    }
}
