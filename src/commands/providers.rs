use clap::Args;
use serde::Serialize;

use transtats_jobs::engine::CommandRegistry;

use super::CmdResult;

#[derive(Args)]
pub struct ProvidersArgs {
    /// Show a single command keyword
    pub command: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProviderSummary {
    command: &'static str,
    operations: Vec<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    aliases: Vec<AliasSummary>,
}

#[derive(Debug, Serialize)]
pub struct AliasSummary {
    phrase: &'static str,
    operation: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ProvidersOutput {
    command: String,
    providers: Vec<ProviderSummary>,
}

pub fn run(args: ProvidersArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<ProvidersOutput> {
    let registry = CommandRegistry::with_builtin();
    let wanted = args.command.map(|c| c.trim().to_uppercase());

    let providers: Vec<ProviderSummary> = registry
        .providers()
        .filter(|p| wanted.as_deref().map_or(true, |w| p.command() == w))
        .map(|p| ProviderSummary {
            command: p.command(),
            operations: p.operations().to_vec(),
            aliases: p
                .aliases()
                .iter()
                .map(|&(phrase, operation)| AliasSummary { phrase, operation })
                .collect(),
        })
        .collect();

    if providers.is_empty() {
        if let Some(wanted) = wanted {
            return Err(transtats_jobs::Error::validation_invalid_argument(
                "command",
                format!("Unknown command keyword '{}'", wanted),
                Some(wanted),
                Some(registry.commands().iter().map(|c| c.to_string()).collect()),
            ));
        }
    }

    Ok((
        ProvidersOutput {
            command: "providers".to_string(),
            providers,
        },
        0,
    ))
}
