pub mod deployer;
