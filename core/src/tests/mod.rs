mod reconcile_flow;
mod redemption_flow;
mod storage;
