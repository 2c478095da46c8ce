mod reconcile;
mod refresh;
mod scenarios;
