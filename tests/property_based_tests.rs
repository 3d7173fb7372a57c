use contact_enrichment::database::{InMemoryJobStore, JobStore};
use contact_enrichment::models::{BatchResult, ContactRecord, NewJob};
use contact_enrichment::orchestration::{summarize, BatchSplitter};
use proptest::prelude::*;

fn batch_result_strategy() -> impl Strategy<Value = BatchResult> {
    (1i64..10_000, 0i64..50, 0i64..50).prop_map(|(batch_id, success, failed)| BatchResult {
        batch_id,
        processed: success + failed,
        success,
        failed,
        error_contact_ids: Vec::new(),
    })
}

fn record_strategy() -> impl Strategy<Value = ContactRecord> {
    (
        "[A-Za-z ]{0,12}",
        prop::option::of("[a-z]{1,8}@example\\.com"),
        "[A-Za-z]{0,10}",
    )
        .prop_map(|(name, email, company)| ContactRecord {
            name,
            email: email.unwrap_or_default(),
            company,
            phone: String::new(),
        })
}

proptest! {
    /// Property: slices cover the input exactly once, in order
    #[test]
    fn split_is_a_complete_ordered_partition(
        records in prop::collection::vec(any::<u32>(), 0..200),
        batch_size in 1usize..17,
    ) {
        let splitter = BatchSplitter::new(batch_size).unwrap();
        let plan = splitter.plan(&records).unwrap();

        let rejoined: Vec<u32> = plan.iter().flat_map(|s| s.records.iter().copied()).collect();
        prop_assert_eq!(&rejoined, &records);
        prop_assert_eq!(plan.len(), records.len().div_ceil(batch_size));

        for (index, slice) in plan.iter().enumerate() {
            prop_assert_eq!(slice.batch_number as usize, index);
            prop_assert!(!slice.records.is_empty());
            if index + 1 < plan.len() {
                prop_assert_eq!(slice.records.len(), batch_size);
            } else {
                prop_assert!(slice.records.len() <= batch_size);
            }
        }
    }

    /// Property: aggregation does not depend on the order results arrive in
    #[test]
    fn summarize_is_order_independent(
        results in prop::collection::vec(batch_result_strategy(), 0..30),
    ) {
        let forward = summarize(&results);
        let mut reversed = results.clone();
        reversed.reverse();
        let mut rotated = results.clone();
        if !rotated.is_empty() {
            rotated.rotate_left(results.len() / 2);
        }

        prop_assert_eq!(forward, summarize(&reversed));
        prop_assert_eq!(forward, summarize(&rotated));
        // same inputs, same totals
        prop_assert_eq!(forward, summarize(&results));
        prop_assert_eq!(forward.success + forward.failed, forward.processed);
        prop_assert_eq!(forward.is_clean(), results.iter().all(|r| r.failed == 0));
    }

    /// Property: persisted batches and contacts add up to the job total
    #[test]
    fn materialized_batches_account_for_every_contact(
        records in prop::collection::vec(record_strategy(), 0..40),
        batch_size in 1usize..7,
    ) {
        tokio_test::block_on(async {
            let store = InMemoryJobStore::new();
            let job = store
                .create_job(NewJob {
                    filename: "contacts.csv".into(),
                    total_count: records.len() as i64,
                })
                .await
                .unwrap();

            let splitter = BatchSplitter::new(batch_size).unwrap();
            let batches = splitter.materialize(&store, job.job_id, &records).await.unwrap();

            let batch_total: i64 = batches.iter().map(|b| b.total_count).sum();
            assert_eq!(batch_total, job.total_count);

            for batch in &batches {
                let stored = store.count_contacts(batch.batch_id).await.unwrap();
                assert_eq!(stored, batch.total_count);
            }

            let contacts = store.list_job_contacts(job.job_id).await.unwrap();
            assert_eq!(contacts.len(), records.len());
        });
    }
}
