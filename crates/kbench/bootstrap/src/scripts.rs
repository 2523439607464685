//! Provisioning scripts run on testbed hosts

/// Placeholder replaced with the configured vHive version.
pub const VERSION_TAG: &str = "TAG_VHIVE_VERSION";

/// Log the master's cluster initialization writes to; polled for the join command.
pub const MASTER_INIT_LOG: &str = "/tmp/vhive-logs/create_multinode_cluster.stdout";

const PROVISION_ALL_NODES: &str = r#"
    echo "Cleaning stuff"
    if [ -d "vhive" ]; then
        echo "Cleaning processes..."
        cd vhive
        sudo scripts/github_runner/clean_cri_runner.sh
        cd
        pkill -9 node_exporter
        pkill -9 prometheus
    fi
    echo "Cleaning dirs..."
    sudo rm -r *
    sudo rm -r /tmp/*

    echo "performance" | sudo tee /sys/devices/system/cpu/cpu*/cpufreq/scaling_governor

    git clone https://github.com/vhive-serverless/vhive.git
    cd vhive
    git checkout TAG_VHIVE_VERSION
    mkdir -p /tmp/vhive-logs
    ./scripts/cloudlab/setup_node.sh stock-only > >(tee -a /tmp/vhive-logs/setup_node.stdout) 2> >(tee -a /tmp/vhive-logs/setup_node.stderr >&2)
"#;

const CONFIGURE_WORKER: &str = r#"
    cd vhive
    ./scripts/cluster/setup_worker_kubelet.sh stock-only > >(tee -a /tmp/vhive-logs/setup_worker_kubelet.stdout) 2> >(tee -a /tmp/vhive-logs/setup_worker_kubelet.stderr >&2)
    sudo screen -dmS containerd bash -c "containerd > >(tee -a /tmp/vhive-logs/containerd.stdout) 2> >(tee -a /tmp/vhive-logs/containerd.stderr >&2)"
    source /etc/profile && go build
    sudo screen -dmS vhive bash -c "./vhive > >(tee -a /tmp/vhive-logs/vhive.stdout) 2> >(tee -a /tmp/vhive-logs/vhive.stderr >&2)"
"#;

const INIT_MASTER: &str = r#"
    cd vhive
    sudo screen -dmS containerd bash -c "containerd > >(tee -a /tmp/vhive-logs/containerd.stdout) 2> >(tee -a /tmp/vhive-logs/containerd.stderr >&2)"
    ./scripts/cluster/create_multinode_cluster.sh stock-only > >(tee -a /tmp/vhive-logs/create_multinode_cluster.stdout) 2> >(tee -a /tmp/vhive-logs/create_multinode_cluster.stderr >&2)
"#;

const INSTALL_VSWARM: &str = r#"
    git clone https://github.com/vhive-serverless/vSwarm.git
    echo "Y" | sudo apt install protobuf-compiler
    echo "Y" | sudo apt install golang-goprotobuf-dev

    echo 'export GOROOT=/usr/local/go' >> ~/.bashrc
    echo 'export GOPATH=$HOME/go' >> ~/.bashrc
    echo 'export GOROOTBIN=$GOROOT/bin' >> ~/.bashrc
    echo 'export GOBIN=$GOPATH/bin' >> ~/.bashrc
    echo 'export PATH=$PATH:$GOROOT:$GOPATH:$GOBIN:$GOROOTBIN' >> ~/.bashrc

    export GOROOT=/usr/local/go
    export GOPATH=$HOME/go
    export GOROOTBIN=$GOROOT/bin
    export GOBIN=$GOPATH/bin
    export PATH=$PATH:$GOROOT:$GOPATH:$GOBIN:$GOROOTBIN

    cd ~/vSwarm/tools/invoker
    go get google.golang.org/grpc/cmd/protoc-gen-go-grpc
    go install google.golang.org/grpc/cmd/protoc-gen-go-grpc
    make invoker

    kubectl patch ConfigMap config-features -n knative-serving -p '{"data":{"kubernetes.podspec-affinity":"enabled"}}'
    kubectl patch ConfigMap config-features -n knative-serving -p '{"data":{"kubernetes.podspec-tolerations":"enabled"}}'
"#;

const INSTALL_METRICS_AGENTS: &str = r#"
    wget https://github.com/prometheus/node_exporter/releases/download/v1.5.0/node_exporter-1.5.0.linux-amd64.tar.gz
    tar -xvf node_exporter-1.5.0.linux-amd64.tar.gz
    wget https://github.com/prometheus/prometheus/releases/download/v2.43.0/prometheus-2.43.0.linux-amd64.tar.gz
    tar -xvf prometheus-2.43.0.linux-amd64.tar.gz

    cd prometheus-2.43.0.linux-amd64/
    echo "
global:
  scrape_interval: 1s

scrape_configs:
- job_name: node
  static_configs:
  - targets: ['$(hostname -i):9100']
        " > prometheus.yml

    cd
    cd node_exporter-1.5.0.linux-amd64/
    ./node_exporter > /dev/null 2>&1 &
    cd
    cd prometheus-2.43.0.linux-amd64/
    ./prometheus --config.file=./prometheus.yml > /dev/null 2>&1 &

    exit 0
"#;

/// The scripts for one bootstrap, with the vHive version filled in.
#[derive(Debug, Clone)]
pub struct ProvisionScripts {
    pub provision_all: String,
    pub configure_worker: String,
    pub init_master: String,
    pub install_vswarm: String,
    pub install_metrics_agents: String,
}

impl ProvisionScripts {
    pub fn for_version(vhive_version: &str) -> Self {
        Self {
            provision_all: PROVISION_ALL_NODES.replace(VERSION_TAG, vhive_version),
            configure_worker: CONFIGURE_WORKER.to_string(),
            init_master: INIT_MASTER.to_string(),
            install_vswarm: INSTALL_VSWARM.to_string(),
            install_metrics_agents: INSTALL_METRICS_AGENTS.to_string(),
        }
    }

    /// Command that prints the master's initialization log.
    pub fn read_master_log() -> String {
        format!("cat {}", MASTER_INIT_LOG)
    }
}
