use console::Style;
use flume::Receiver;

use crate::runner::RunEvent;

pub struct OutPutter;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
}

impl OutPutter {
    /// Prints one line per finished test until the runner hangs up, then the
    /// details of the failure that stopped the run, if any.
    pub async fn start(rx: Receiver<RunEvent>, plan_name: &str, n_tests: usize) -> Summary {
        let style = Style::new().bold().cyan();
        let open_text = format!("Running {plan_name}: Found {n_tests} tests: Running...");

        println!("{}", style.apply_to(open_text));

        let mut summary = Summary::default();
        let mut failure = None;

        while let Ok(event) = rx.recv_async().await {
            let i = summary.passed + summary.failed + 1;

            match &event {
                RunEvent::Passed {
                    name,
                    method,
                    url,
                    status,
                } => {
                    summary.passed += 1;
                    println!(
                        "[{i}/{n_tests}] {}  {name}: {method} {url} Got status {status} {}",
                        console::style("✔").green().bold(),
                        console::style("PASS!").green().bold(),
                    )
                }
                RunEvent::Failed { name, reason, .. } => {
                    summary.failed += 1;
                    println!(
                        "[{i}/{n_tests}] {}  {name}: {reason} {}",
                        console::style("╳").red().bold(),
                        console::style("FAILED!").red().bold(),
                    );
                }
            }

            if matches!(event, RunEvent::Failed { .. }) {
                failure = Some(event);
            }
        }

        if let Some(RunEvent::Failed {
            name,
            description,
            method,
            url,
            reason,
            response,
        }) = failure
        {
            println!();
            println!("{}", console::style("Run stopped by failed test:").bold().red());
            println!(
                "  {} {}",
                console::style(&name).yellow().bold(),
                console::style(description).dim()
            );
            println!("  {method} {url}");
            println!("  {}", console::style(reason).red());
            if let Some((status, body)) = response {
                println!("  {}", console::style(format!("RX code {status}:")).red());
                println!("{}", console::style(body).red());
            }
        } else if summary.passed < n_tests {
            println!();
            println!(
                "{}",
                console::style(format!(
                    "Run stopped after {} of {n_tests} tests",
                    summary.passed
                ))
                .bold()
                .red()
            );
        }

        summary
    }
}

#[cfg(test)]
mod test {
    use reqwest::StatusCode;

    use crate::outputter::OutPutter;
    use crate::outputter::Summary;
    use crate::runner::RunEvent;

    #[tokio::test]
    async fn counts_until_sender_is_dropped() {
        let (tx, rx) = flume::unbounded();

        tx.send(RunEvent::Passed {
            name: "NA1".into(),
            method: "GET".into(),
            url: "http://localhost/admin/v1/users".into(),
            status: StatusCode::UNAUTHORIZED,
        })
        .unwrap();
        tx.send(RunEvent::Failed {
            name: "NA2".into(),
            description: "Invalid URL".into(),
            method: "POST".into(),
            url: "http://localhost/admin/v1/nonexist".into(),
            reason: "Got status 404. Expected 405".into(),
            response: Some((StatusCode::NOT_FOUND, "{}".into())),
        })
        .unwrap();
        drop(tx);

        let summary = OutPutter::start(rx, "test plan", 3).await;
        assert_eq!(
            summary,
            Summary {
                passed: 1,
                failed: 1
            }
        );
    }
}
