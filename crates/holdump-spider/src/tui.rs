use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress display for a batch run: a total bar plus success/failure bars
/// underneath it, and a spinner per unit currently being processed.
///
/// Constructed hidden when tracing output is active instead of the tui.
pub(crate) struct Bars {
    multi: Option<MultiProgress>,
    total: Option<ProgressBar>,
    successes: Option<ProgressBar>,
    failures: Option<ProgressBar>,
}

impl Bars {
    pub(crate) fn hidden() -> Self {
        Self {
            multi: None,
            total: None,
            successes: None,
            failures: None,
        }
    }

    pub(crate) fn new(len: usize) -> anyhow::Result<Self> {
        let multi = MultiProgress::new();

        // total number of units to process
        let total = multi.add(
            ProgressBar::new(len as u64).with_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.magenta}\n \
                            {msg:>9.white} |{bar:57.white/grey}| {pos:<2} / {human_len} \
                            ({percent_precise}%) [Time: {elapsed}, Rate: {per_sec}, ETA: {eta}]",
                    )?
                    .progress_chars("## "),
            ),
        );
        total.set_message("total");
        total.enable_steady_tick(Duration::from_millis(100));

        // successful units
        let successes = multi.insert_after(
            &total,
            ProgressBar::new(len as u64).with_style(
                ProgressStyle::default_bar()
                    .template(" {msg:>9.green} |{bar:57.green}| {pos:<2.green}")?
                    .progress_chars("## "),
            ),
        );
        successes.set_message("successes");

        // failed or skipped units
        let failures = multi.insert_after(
            &successes,
            ProgressBar::new(len as u64).with_style(
                ProgressStyle::default_bar()
                    .template(" {msg:>9.red} |{bar:57.red}| {pos:<2.red}")?
                    .progress_chars("## "),
            ),
        );
        failures.set_message("failures");

        Ok(Self {
            multi: Some(multi),
            total: Some(total),
            successes: Some(successes),
            failures: Some(failures),
        })
    }

    pub(crate) fn spinner(&self, msg: String) -> ProgressBar {
        let spinner = match &self.multi {
            Some(multi) => multi.add(
                ProgressBar::new_spinner().with_message(msg).with_style(
                    ProgressStyle::default_spinner()
                        .template("\t   > {msg}")
                        .expect("failed to set spinner style"),
                ),
            ),
            None => ProgressBar::hidden(),
        };
        spinner.enable_steady_tick(Duration::from_millis(50));
        spinner
    }

    pub(crate) fn success(&self) {
        if let Some(bar) = &self.successes {
            bar.inc(1);
        }
        if let Some(bar) = &self.total {
            bar.inc(1);
        }
    }

    pub(crate) fn failure(&self) {
        if let Some(bar) = &self.failures {
            bar.inc(1);
        }
        if let Some(bar) = &self.total {
            bar.inc(1);
        }
    }

    pub(crate) fn finish(&self) {
        for bar in [&self.failures, &self.successes, &self.total]
            .into_iter()
            .flatten()
        {
            bar.finish_and_clear();
        }
    }
}
