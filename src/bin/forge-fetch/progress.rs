use forge_fetch::{Fetcher, Input, Tree};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

pub type FetchResult = Result<(Tree, Input), forge_fetch::Error>;

fn make_progress_spinner(m: &MultiProgress, prefix: String) -> ProgressBar {
    let pb = m.add(ProgressBar::new_spinner());
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    pb.set_style(
        ProgressStyle::with_template("{prefix:.cyan.bold/blue.bold} 🔎 {msg:.cyan/blue} {spinner}")
            .expect("invalid progress template")
            .tick_chars("⣾⣽⣻⢿⡿⣟⣯⣷"),
    );
    pb.set_prefix(prefix);
    pb
}

fn complete_progress_bar(pb: ProgressBar, input: &Input, result: &FetchResult) {
    let template = if result.is_ok() {
        "{prefix:.cyan.bold/blue.bold} {msg:.cyan/blue}"
    } else {
        "{prefix:.cyan.bold/blue.bold} {msg:.red.bold}"
    };
    pb.set_style(ProgressStyle::with_template(template).expect("invalid progress template"));
    let status = match result {
        Ok((tree, _)) => format!("😸 {input} -> {}", tree.path.display()),
        Err(_) => format!("😿 failed to fetch '{input}'"),
    };
    pb.finish_with_message(status);
}

// Fetch a single input, reporting progress in the provided progress bar
fn fetch_one(fetcher: &Fetcher, input: &Input, bar: ProgressBar) -> FetchResult {
    bar.set_message(input.to_string());
    let result = fetcher.fetch(input);
    complete_progress_bar(bar, input, &result);
    result
}

// Fetch inputs in parallel with `rayon`. Pair each input with its own progress bar. Using
// ordered bars means the bars are shown in order
pub fn parallel_fetch(fetcher: &Fetcher, inputs: &[Input]) -> Vec<FetchResult> {
    use rayon::prelude::*;
    let count = inputs.len();
    let mp = MultiProgress::new();
    let ordered_bars = (0..count)
        .map(|k| make_progress_spinner(&mp, format!("[{}/{count}]", k + 1)))
        .collect::<Vec<_>>();
    ordered_bars
        .into_iter()
        .zip(inputs)
        // Have to `collect()` first because we can't use parallel iterator with Zip
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|(bar, input)| fetch_one(fetcher, input, bar))
        .collect::<Vec<_>>()
}
