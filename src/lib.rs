pub mod accumulator;
pub mod batch;
pub mod channel;
pub mod error;
pub mod mux;

// Re-export main types for easier access
pub use accumulator::SharedAccumulator;
pub use batch::{
    BatchHandle,
    BatchReport,
    BatchStatus,
    BatchSummary,
    CompletionTracker,
    Dispatcher,
    UnitResult,
    UnitStatus,
    WorkUnit,
};
pub use channel::{result_channel, Capacity, ResultReceiver, ResultSender};
pub use error::{PipelineError, PipelineResult};
pub use mux::{Multiplexer, Selected};

#[cfg(test)]
mod tests {
    use super::*;

    // Three workers split one sentence each and append the words to a shared
    // accumulator; the final contents are the union of all the words.
    #[tokio::test]
    async fn sentence_workers_accumulate_every_word() {
        let sentences = [
            "the quick brown fox jumps over the lazy dog",
            "concurrency is not parallelism",
            "share memory by communicating",
        ];
        let expected: usize = sentences.iter().map(|s| s.split_whitespace().count()).sum();

        let words: SharedAccumulator<String> = SharedAccumulator::new();
        let units: Vec<WorkUnit<usize>> = sentences
            .iter()
            .map(|&sentence| {
                let words = words.clone();
                WorkUnit::new(move || {
                    let parts: Vec<String> =
                        sentence.split_whitespace().map(str::to_string).collect();
                    let appended = parts.len();
                    words.extend(parts);
                    Ok(appended)
                })
            })
            .collect();

        let report = Dispatcher::new().dispatch(units).collect().await;
        assert_eq!(report.summary.status, BatchStatus::Success);

        let appended: usize = report.results.into_iter().map(|r| r.value.unwrap()).sum();
        assert_eq!(appended, expected);
        assert_eq!(words.len(), expected);
        let collected = words.into_items();
        for word in ["fox", "parallelism", "communicating"] {
            assert!(collected.iter().any(|w| w == word));
        }
    }

    // Two independent batches feed one multiplexer, which drains both
    // result channels with a single consuming loop.
    #[tokio::test]
    async fn two_batches_drain_through_one_multiplexer() {
        let squares: Vec<WorkUnit<u32>> =
            (0..10).map(|i| WorkUnit::new(move || Ok(i * i))).collect();
        let cubes: Vec<WorkUnit<u32>> =
            (0..5).map(|i| WorkUnit::new(move || Ok(i * i * i))).collect();

        let dispatcher = Dispatcher::new().with_capacity(Capacity::Bounded(4));
        let mut mux = Multiplexer::new();
        let squares_src = mux.register("squares", dispatcher.dispatch(squares).into_results());
        let cubes_src = mux.register("cubes", dispatcher.dispatch(cubes).into_results());

        let mut counts = [0usize; 2];
        loop {
            match mux.select_next().await {
                Selected::Item { source, value } => {
                    assert!(value.is_success());
                    counts[source] += 1;
                }
                Selected::Closed => break,
                Selected::Cancelled => unreachable!(),
            }
        }

        assert_eq!(counts[squares_src], 10);
        assert_eq!(counts[cubes_src], 5);
    }
}
