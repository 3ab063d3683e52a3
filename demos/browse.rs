use servicetree::{net::IpVersion, transport::mdns::MdnsTransportBuilder, DiscoveryBuilder, ResolutionState};
use std::time::Duration;

fn main() {
	simple_logger::SimpleLogger::new().with_level(log::LevelFilter::Info).init().unwrap();

	let transport = MdnsTransportBuilder::new().build(IpVersion::V4).expect("Failed to bind mDNS socket");

	let discovery = DiscoveryBuilder::new(transport).build().run_in_background(|tree| {
		println!("==== {} types, {} instances ====", tree.types().len(), tree.len());

		for node in tree.nodes() {
			println!("{}", node.service_type());

			for instance in node.instances() {
				match instance.state() {
					ResolutionState::Pending => println!("  {} (resolving)", instance.name()),
					ResolutionState::Failed => println!("  {} (unresolved)", instance.name()),
					ResolutionState::Resolved => {
						println!(
							"  {} -> {}:{}",
							instance.name(),
							instance.addresses().join(", "),
							instance.port().unwrap_or_default()
						);
						for (key, value) in instance.txt() {
							println!("    {key}={value}");
						}
					}
				}
			}
		}
	});

	std::thread::sleep(Duration::from_secs(30));

	println!("Shutting down...");
	discovery.shutdown().unwrap();
	println!("Done!");
}
