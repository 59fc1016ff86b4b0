mod record;
mod step;
mod workflow;
