//! Load testing for the load balancer.

use std::collections::HashMap;
use std::time::Instant;

mod common;

#[tokio::test]
async fn test_load_spreads_across_backends() {
    let (b0, _h0) = common::start_mock_backend("b0").await;
    let (b1, _h1) = common::start_mock_backend("b1").await;
    let (b2, _h2) = common::start_mock_backend("b2").await;

    let balancer = common::start_balancer(common::config(&[b0, b1, b2])).await;

    let concurrency = 20;
    let requests_per_task = 15;
    let total_requests = concurrency * requests_per_task;

    let client = common::client();
    let start = Instant::now();

    let mut tasks = Vec::new();
    for _ in 0..concurrency {
        let client = client.clone();
        let url = balancer.url("/");
        tasks.push(tokio::spawn(async move {
            let mut bodies = Vec::new();
            for _ in 0..requests_per_task {
                if let Ok(res) = client.get(&url).send().await {
                    if res.status().is_success() {
                        bodies.push(res.text().await.unwrap_or_default());
                    }
                }
            }
            bodies
        }));
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for task in tasks {
        for body in task.await.unwrap() {
            *counts.entry(body).or_default() += 1;
        }
    }

    let total_time = start.elapsed();
    let succeeded: usize = counts.values().sum();
    println!("--- Load Test Results ---");
    println!("Total Requests: {}", total_requests);
    println!("Succeeded: {}", succeeded);
    println!("Total Time: {:?}", total_time);
    println!("Distribution: {:?}", counts);

    assert_eq!(succeeded, total_requests);
    for name in ["b0", "b1", "b2"] {
        let hits = counts.get(name).copied().unwrap_or(0);
        // The shared cursor hands out picks in rotation.
        let fair = total_requests / 3;
        assert!(hits.abs_diff(fair) <= fair / 10, "{name} got {hits}");
    }
}
