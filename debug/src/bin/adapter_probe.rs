//! Minimal wgpu init (no window). Verifies an adapter exists and reports
//! whether the multi-draw-indirect features the viewer needs are available.

fn main() {
    env_logger::init();
    pollster::block_on(async {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .expect("No adapter");
        let info = adapter.get_info();
        println!("adapter: {} ({:?})", info.name, info.backend);
        let features = adapter.features();
        println!(
            "multi-draw indirect: {}",
            features.contains(wgpu::Features::MULTI_DRAW_INDIRECT)
        );
        println!(
            "multi-draw indirect count: {}",
            features.contains(wgpu::Features::MULTI_DRAW_INDIRECT_COUNT)
        );
        println!(
            "max buffer size: {}",
            adapter.limits().max_buffer_size
        );
    });
}
