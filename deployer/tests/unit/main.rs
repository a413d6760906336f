mod test_deploy;
mod test_fsm;
mod test_webhook;
