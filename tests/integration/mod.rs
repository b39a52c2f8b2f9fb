mod test_advisor_flow;
mod test_collection;
mod test_history_queries;
mod test_monitor_pipeline;
