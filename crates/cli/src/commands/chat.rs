use std::io::{self, BufRead, Write};
use std::sync::Arc;

use karbon_agent::audit::TracingAuditSink;
use karbon_agent::guardrails::GuardrailPolicy;
use karbon_agent::llm::OpenAiCompatibleClient;
use karbon_agent::tools::ToolRegistry;
use karbon_agent::{AgentRuntime, Session};
use karbon_core::config::LoadOptions;

use crate::commands::{
    async_runtime, build_engine, load_config, CommandResult, EXIT_CONFIG, EXIT_RUNTIME,
};

const EXIT_WORDS: [&str; 3] = ["exit", "quit", ":q"];

pub fn run(load_options: LoadOptions) -> CommandResult {
    let stdin = io::stdin();
    let stdout = io::stdout();
    run_with_io(stdin.lock(), stdout.lock(), load_options)
}

/// Line-oriented chat loop. Ends on EOF or an exit word.
pub fn run_with_io<R, W>(input: R, mut output: W, load_options: LoadOptions) -> CommandResult
where
    R: BufRead,
    W: Write,
{
    let config = match load_config("chat", load_options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    if !config.llm.enabled {
        return CommandResult::failure(
            "chat",
            "llm_disabled",
            "chat needs a language model; set llm.enabled = true (KARBON_LLM_ENABLED) and \
             provide KARBON_LLM_API_KEY",
            EXIT_CONFIG,
        );
    }

    let engine = match build_engine("chat", &config) {
        Ok(engine) => engine,
        Err(result) => return result,
    };
    let client = match OpenAiCompatibleClient::from_config(&config.llm) {
        Ok(client) => client,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "llm_client",
                format!("could not build llm client: {error}"),
                EXIT_CONFIG,
            )
        }
    };
    let runtime = match async_runtime("chat") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let agent = AgentRuntime::new(
        Arc::new(client),
        ToolRegistry::with_emission_tools(Arc::new(engine), config.report.display_decimals),
        GuardrailPolicy::default(),
        Arc::new(TracingAuditSink),
    )
    .with_max_tool_rounds(config.llm.max_tool_rounds)
    .with_temperature(config.llm.temperature)
    .with_display_decimals(config.report.display_decimals);

    let mut session = Session::default();
    let mut turns = 0_usize;
    if writeln!(output, "{}\n(type `exit` to leave)", session.greeting()).is_err() {
        return stdout_failure();
    }

    for line in input.lines() {
        let Ok(line) = line else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&text.to_ascii_lowercase().as_str()) {
            break;
        }

        let reply = runtime.block_on(agent.handle_turn(&mut session, text));
        turns += 1;
        let marker = if reply.degraded { " [degraded]" } else { "" };
        if writeln!(output, "assistant{marker}> {}", reply.text).is_err() {
            return stdout_failure();
        }
        let _ = output.flush();
    }

    CommandResult::success(
        "chat",
        format!("chat session {} ended after {turns} turn(s)", session.id()),
    )
}

fn stdout_failure() -> CommandResult {
    CommandResult::failure("chat", "io", "could not write to stdout", EXIT_RUNTIME)
}
